//! # Block Registry - Authoritative Block Table and State Machine
//!
//! Owns the metadata of every block ever allocated and applies lifecycle
//! transitions. Every public transition validates all of its preconditions
//! before touching the table, so a rejected call leaves the registry
//! unchanged.
//!
//! ## Transitions
//!
//! | Method | From | To | Failure kinds |
//! |--------|------|----|---------------|
//! | `revive` / `insert_fresh` | Zombie / none | Write | NotFound |
//! | `commit` | Write | Idle | InvalidOwner, InvalidState, StaleGeneration |
//! | `request_data` | Idle, Busy | Busy | NotFound, InvalidState, StaleGeneration |
//! | `release` | Busy | Busy, Idle | DoubleRelease, InvalidState, StaleGeneration |
//! | `delete` | Idle, Busy | Zombie | Busy, InvalidState, NotFound |
//! | `reap_owner` | Write | Zombie | never fails |
//!
//! Block ids index directly into a `Vec`, keeping every lookup O(1).

use super::entities::{
    AccessMode, Block, BlockId, BlockRef, BlockState, ClientId, Generation, Handle,
    RegionDescriptor,
};
use shared_types::StoreError;
use std::num::NonZeroU32;
use tracing::debug;

/// Number of blocks in each lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub write: usize,
    pub idle: usize,
    pub busy: usize,
    pub zombie: usize,
    /// Sum of reader counts over Busy blocks.
    pub readers: u64,
}

/// The table of all blocks.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: Vec<Block>,
}

impl BlockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks ever allocated.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no block was ever allocated.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Looks up a block by id, Zombies included.
    pub fn get(&self, block_id: BlockId) -> Option<&Block> {
        usize::try_from(block_id.0)
            .ok()
            .and_then(|index| self.blocks.get(index))
    }

    fn get_mut(&mut self, block_id: BlockId) -> Option<&mut Block> {
        usize::try_from(block_id.0)
            .ok()
            .and_then(move |index| self.blocks.get_mut(index))
    }

    /// Iterates over every block in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    fn lookup(&self, block_id: BlockId) -> Result<&Block, StoreError> {
        self.get(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {}", block_id)))
    }

    // =========================================================================
    // VALIDATION (no mutation)
    // =========================================================================

    /// Checks that `block` names a live block at its current generation.
    ///
    /// A Zombie block rejects every handle, even one at the Zombie's own
    /// generation: force delete invalidates outstanding handles immediately.
    pub fn validate_ref(&self, block: BlockRef) -> Result<&Block, StoreError> {
        let current = self.lookup(block.block_id)?;
        if current.generation() != block.generation || current.is_zombie() {
            return Err(StoreError::StaleGeneration {
                block_id: block.block_id,
                presented: block.generation,
                current: current.generation(),
            });
        }
        Ok(current)
    }

    /// Checks that a read handle could be issued on `block_id`.
    ///
    /// With `expected` set the caller is presenting a handle, so a Zombie or
    /// a generation mismatch is reported as `StaleGeneration`. Without it a
    /// Zombie is simply `NotFound`.
    pub fn check_readable(
        &self,
        block_id: BlockId,
        expected: Option<Generation>,
    ) -> Result<&Block, StoreError> {
        let block = match expected {
            Some(generation) => self.validate_ref(BlockRef::new(block_id, generation))?,
            None => self.lookup(block_id)?,
        };
        match block.state() {
            BlockState::Zombie => Err(StoreError::not_found(format!("block {}", block_id))),
            BlockState::Write { .. } => Err(StoreError::invalid_state(
                block_id.to_string(),
                "block is not committed yet",
            )),
            BlockState::Busy { readers } if readers.get() == u32::MAX => {
                Err(StoreError::Exhausted {
                    requested: 1,
                    reason: format!("reader slots of {} exhausted", block_id),
                })
            }
            BlockState::Idle | BlockState::Busy { .. } => Ok(block),
        }
    }

    /// Checks that `caller` may commit `block`: it must be in Write state
    /// and owned by `caller`.
    pub fn check_commit(&self, block: BlockRef, caller: ClientId) -> Result<(), StoreError> {
        let current = self.validate_ref(block)?;
        match current.state() {
            BlockState::Write { owner } if owner == caller => Ok(()),
            BlockState::Write { .. } => Err(StoreError::InvalidOwner {
                block_id: block.block_id,
                caller,
            }),
            other => Err(StoreError::invalid_state(
                block.block_id.to_string(),
                format!("cannot commit a block in {} state", other.name()),
            )),
        }
    }

    /// Checks that `count` releases of `block` would all succeed.
    ///
    /// Returns the reader count that would remain afterwards.
    pub fn check_release(&self, block: BlockRef, count: u32) -> Result<u32, StoreError> {
        let current = self.validate_ref(block)?;
        match current.state() {
            BlockState::Write { .. } => Err(StoreError::invalid_state(
                block.block_id.to_string(),
                "block is being written, there is no read handle to release",
            )),
            BlockState::Busy { readers } if readers.get() >= count => Ok(readers.get() - count),
            _ => Err(StoreError::DoubleRelease {
                block_id: block.block_id,
            }),
        }
    }

    /// Checks that `block_id` could be deleted.
    pub fn check_delete(&self, block_id: BlockId, force: bool) -> Result<&Block, StoreError> {
        let block = self.lookup(block_id)?;
        match block.state() {
            BlockState::Zombie => Err(StoreError::not_found(format!("block {}", block_id))),
            BlockState::Write { .. } => Err(StoreError::invalid_state(
                block_id.to_string(),
                "block is being written; reap its owner instead",
            )),
            BlockState::Busy { readers } if !force => Err(StoreError::Busy {
                block_id,
                readers: readers.get(),
            }),
            BlockState::Idle | BlockState::Busy { .. } => Ok(block),
        }
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Registers a newly allocated region as a block in Write for `owner`.
    pub(crate) fn insert_fresh(
        &mut self,
        size: usize,
        region: RegionDescriptor,
        owner: ClientId,
    ) -> &Block {
        let block_id = BlockId(self.blocks.len() as u64);
        debug!(block_id = %block_id, size, capacity = region.capacity, "block allocated");
        self.blocks.push(Block::fresh(block_id, size, region, owner));
        &self.blocks[self.blocks.len() - 1]
    }

    /// Zombie → Write: hands a pooled block to a new writer.
    pub(crate) fn revive(
        &mut self,
        block_id: BlockId,
        size: usize,
        owner: ClientId,
    ) -> Result<&Block, StoreError> {
        let block = self
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {}", block_id)))?;
        if !block.is_zombie() {
            return Err(StoreError::invalid_state(
                block_id.to_string(),
                format!("cannot reuse a block in {} state", block.state().name()),
            ));
        }
        block.revive(size, owner);
        debug!(
            block_id = %block_id,
            generation = %block.generation(),
            size,
            "block reused"
        );
        Ok(&*block)
    }

    /// Write → Idle: publishes the block. Only the owner may commit.
    pub fn commit(&mut self, block: BlockRef, caller: ClientId) -> Result<Handle, StoreError> {
        self.check_commit(block, caller)?;

        let current = self
            .get_mut(block.block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {}", block.block_id)))?;
        current.set_state(BlockState::Idle);
        debug!(block_id = %block.block_id, generation = %block.generation, "block committed");
        Ok(current.handle(AccessMode::Read))
    }

    /// Idle/Busy → Busy: adds a reader and returns its handle.
    pub fn request_data(
        &mut self,
        block_id: BlockId,
        expected: Option<Generation>,
    ) -> Result<Handle, StoreError> {
        let readers = self.check_readable(block_id, expected)?.reader_count();
        let next = NonZeroU32::new(readers + 1).ok_or_else(|| StoreError::Exhausted {
            requested: 1,
            reason: "reader count overflow".to_string(),
        })?;

        let block = self
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {}", block_id)))?;
        block.set_state(BlockState::Busy { readers: next });
        debug!(block_id = %block_id, readers = next.get(), "read handle issued");
        Ok(block.handle(AccessMode::Read))
    }

    /// Busy → Busy/Idle: drops one reader, returning the remaining count.
    pub fn release(&mut self, block: BlockRef) -> Result<u32, StoreError> {
        let remaining = self.check_release(block, 1)?;
        let current = self
            .get_mut(block.block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {}", block.block_id)))?;
        match NonZeroU32::new(remaining) {
            Some(readers) => current.set_state(BlockState::Busy { readers }),
            None => current.set_state(BlockState::Idle),
        }
        debug!(block_id = %block.block_id, readers = remaining, "read handle released");
        Ok(remaining)
    }

    /// Idle/Busy → Zombie. Returns the now-Zombie block.
    ///
    /// With `force`, readers are discarded and their handles become stale.
    pub fn delete(&mut self, block_id: BlockId, force: bool) -> Result<&Block, StoreError> {
        let dropped_readers = self.check_delete(block_id, force)?.reader_count();
        let block = self
            .get_mut(block_id)
            .ok_or_else(|| StoreError::not_found(format!("block {}", block_id)))?;
        block.set_state(BlockState::Zombie);
        debug!(
            block_id = %block_id,
            force,
            dropped_readers,
            "block returned to pool"
        );
        Ok(&*block)
    }

    /// Write → Zombie for every block owned by `owner`.
    ///
    /// Administrative remedy for a writer that died before committing.
    pub fn reap_owner(&mut self, owner: ClientId) -> Vec<BlockId> {
        let mut reaped = Vec::new();
        for block in self.blocks.iter_mut() {
            if block.owner() == Some(owner) {
                block.set_state(BlockState::Zombie);
                reaped.push(block.id());
            }
        }
        if !reaped.is_empty() {
            debug!(owner = %owner, count = reaped.len(), "reaped uncommitted blocks");
        }
        reaped
    }

    // =========================================================================
    // REPORTING
    // =========================================================================

    /// Counts blocks per state.
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for block in &self.blocks {
            match block.state() {
                BlockState::Write { .. } => counts.write += 1,
                BlockState::Idle => counts.idle += 1,
                BlockState::Busy { readers } => {
                    counts.busy += 1;
                    counts.readers += u64::from(readers.get());
                }
                BlockState::Zombie => counts.zombie += 1,
            }
        }
        counts
    }

    /// Summed capacity of every registered region.
    pub fn region_bytes(&self) -> usize {
        self.blocks.iter().map(Block::capacity).sum()
    }
}
