//! Queue object state.
//!
//! Entries are kept in a `BTreeMap` keyed by sequence number. Pops claim
//! entries strictly oldest first, so claimed entries always form a prefix
//! of the live sequence; `claim_cursor` marks where the unclaimed suffix
//! begins.
//!
//! The popping consumer's read handle is tracked apart from the readers of
//! non-destructive reads, so that only `free_handle` can give it back.

use shared_types::{BlockRef, EntrySeq, StoreError};
use std::collections::BTreeMap;

/// One queue slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    /// Block holding the entry's payload.
    pub block: BlockRef,
    /// Set once a pop handed the entry to a consumer.
    pub claimed: bool,
    /// The popping consumer still holds its read handle.
    pub consumer_holds: bool,
}

/// A FIFO of committed blocks.
#[derive(Clone, Debug, Default)]
pub struct QueueState {
    entries: BTreeMap<EntrySeq, QueueEntry>,
    next_seq: EntrySeq,
    claim_cursor: EntrySeq,
    max_capacity: Option<usize>,
}

impl QueueState {
    pub fn new(max_capacity: Option<usize>) -> Self {
        Self {
            max_capacity,
            ..Self::default()
        }
    }

    /// Live entries, claimed ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_capacity(&self) -> Option<usize> {
        self.max_capacity
    }

    pub fn is_full(&self) -> bool {
        self.max_capacity
            .is_some_and(|capacity| self.entries.len() >= capacity)
    }

    /// Sequence number of the oldest live entry.
    pub fn head(&self) -> Option<EntrySeq> {
        self.entries.keys().next().copied()
    }

    /// Sequence number the next push receives.
    pub fn tail(&self) -> EntrySeq {
        self.next_seq
    }

    pub fn get(&self, seq: EntrySeq) -> Option<&QueueEntry> {
        self.entries.get(&seq)
    }

    /// Newest live entry.
    pub fn latest(&self) -> Option<(EntrySeq, &QueueEntry)> {
        self.entries.iter().next_back().map(|(&seq, entry)| (seq, entry))
    }

    /// Oldest entry not yet claimed by a pop.
    pub fn next_unclaimed(&self) -> Option<(EntrySeq, BlockRef)> {
        self.entries
            .range(self.claim_cursor..)
            .find(|(_, entry)| !entry.claimed)
            .map(|(&seq, entry)| (seq, entry.block))
    }

    /// Live sequence numbers, oldest first.
    pub fn seqs(&self) -> Vec<EntrySeq> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntrySeq, &QueueEntry)> {
        self.entries.iter().map(|(&seq, entry)| (seq, entry))
    }

    /// Checks that one more entry fits.
    pub fn check_capacity(&self, name: &str) -> Result<(), StoreError> {
        match self.max_capacity {
            Some(capacity) if self.entries.len() >= capacity => Err(StoreError::Exhausted {
                requested: 1,
                reason: format!("queue '{}' is full ({} entries)", name, capacity),
            }),
            _ => Ok(()),
        }
    }

    /// Appends a committed block. Capacity must have been checked.
    pub(crate) fn append(&mut self, block: BlockRef) -> EntrySeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            seq,
            QueueEntry {
                block,
                claimed: false,
                consumer_holds: false,
            },
        );
        seq
    }

    /// Marks `seq` as handed to a consumer.
    pub(crate) fn claim(&mut self, seq: EntrySeq) {
        if let Some(entry) = self.entries.get_mut(&seq) {
            entry.claimed = true;
            entry.consumer_holds = true;
            self.claim_cursor = self.claim_cursor.max(seq + 1);
        }
    }

    /// Records that the consumer gave its popped handle back.
    pub(crate) fn release_consumer(&mut self, seq: EntrySeq) {
        if let Some(entry) = self.entries.get_mut(&seq) {
            entry.consumer_holds = false;
        }
    }

    pub(crate) fn remove(&mut self, seq: EntrySeq) -> Option<QueueEntry> {
        self.entries.remove(&seq)
    }
}
