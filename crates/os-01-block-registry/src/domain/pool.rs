//! Reuse pool of Zombie blocks.
//!
//! Zombies are bucketed by size class. Allocation takes the smallest class
//! that fits (best fit) and, inside a class, the block that became Zombie
//! first (FIFO), so every pooled block is eventually handed out again.

use super::entities::BlockId;
use std::collections::{BTreeMap, VecDeque};

/// Zombie blocks awaiting reuse.
#[derive(Debug, Default)]
pub struct ZombiePool {
    classes: BTreeMap<usize, VecDeque<BlockId>>,
    pooled_bytes: usize,
    len: usize,
}

impl ZombiePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pooled blocks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Summed capacity of pooled blocks.
    pub fn pooled_bytes(&self) -> usize {
        self.pooled_bytes
    }

    /// Adds a block that just became Zombie.
    pub fn push(&mut self, block_id: BlockId, capacity: usize) {
        self.classes.entry(capacity).or_default().push_back(block_id);
        self.pooled_bytes += capacity;
        self.len += 1;
    }

    /// Takes the oldest block of the smallest class holding at least `class`
    /// bytes. Returns the block and its capacity.
    pub fn take_best_fit(&mut self, class: usize) -> Option<(BlockId, usize)> {
        let (&capacity, queue) = self
            .classes
            .range_mut(class..)
            .find(|(_, queue)| !queue.is_empty())?;
        let block_id = queue.pop_front()?;
        if queue.is_empty() {
            self.classes.remove(&capacity);
        }
        self.pooled_bytes -= capacity;
        self.len -= 1;
        Some((block_id, capacity))
    }

    /// Pooled blocks, smallest class first, oldest first within a class.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, usize)> + '_ {
        self.classes
            .iter()
            .flat_map(|(&capacity, queue)| queue.iter().map(move |&id| (id, capacity)))
    }

    /// Empties the pool, returning every pooled block.
    pub fn drain(&mut self) -> Vec<BlockId> {
        self.pooled_bytes = 0;
        self.len = 0;
        std::mem::take(&mut self.classes)
            .into_values()
            .flatten()
            .collect()
    }
}
