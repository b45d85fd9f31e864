//! # Core Entities
//!
//! Identifiers and capability tokens exchanged between clients and the
//! control plane.
//!
//! ## Clusters
//!
//! - **Blocks**: `BlockId`, `Generation`, `BlockRef`
//! - **Access**: `AccessMode`, `Handle`, `RegionDescriptor`
//! - **Identity**: `ClientId`
//! - **Reporting**: `ObjectInfo`, `ObjectKind`, `StoreStats`

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// BLOCKS
// =============================================================================

/// Identifier of a shared-memory block in the registry.
///
/// Ids are never recycled: a reused region keeps its id and gets a new
/// `Generation` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk-{}", self.0)
    }
}

/// Reuse counter of a block.
///
/// Bumped on every Zombie → Write transition, so a handle issued before a
/// reuse can never match the block again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// Generation of a freshly allocated block.
    pub const INITIAL: Generation = Generation(1);

    /// Returns the following generation.
    #[must_use]
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A (block id, generation) pair: the back-reference held by handles and by
/// the object directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block identifier.
    pub block_id: BlockId,
    /// Generation the reference was taken at.
    pub generation: Generation,
}

impl BlockRef {
    /// Creates a new block reference.
    pub fn new(block_id: BlockId, generation: Generation) -> Self {
        Self {
            block_id,
            generation,
        }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.block_id, self.generation)
    }
}

/// Sequence number of an entry inside a queue object.
pub type EntrySeq = u64;

// =============================================================================
// ACCESS
// =============================================================================

/// Access mode granted by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Shared, read-only access to a committed block.
    Read,
    /// Exclusive write access by the block's owner, before commit.
    Write,
}

/// Opaque token naming an OS shared-memory region.
///
/// The control plane only stores and hands out descriptors; resolving one
/// into mapped memory is the job of a region provider in the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Provider-specific region name (file name, segment key, ...).
    pub name: String,
    /// Size of the region in bytes.
    pub capacity: usize,
}

/// Capability authorizing shared-memory access to one block.
///
/// Valid only while `generation` matches the registry's current generation
/// for `block_id`. Handles are plain data: invalidating them needs no
/// notification, the next request that presents one is simply rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    /// Block identifier.
    pub block_id: BlockId,
    /// Generation the handle was issued at.
    pub generation: Generation,
    /// Granted access mode.
    pub mode: AccessMode,
    /// Region backing the block.
    pub region: RegionDescriptor,
    /// Logical payload size requested at creation.
    pub size: usize,
}

impl Handle {
    /// The (id, generation) back-reference of this handle.
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.block_id, self.generation)
    }

    /// Bytes available in the backing region (size-class capacity).
    pub fn capacity(&self) -> usize {
        self.region.capacity
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Identity of a client process, used as the block owner while writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Generates a fresh random client id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// REPORTING
// =============================================================================

/// Shape of a named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A single head block written with `put`.
    Single,
    /// A FIFO of entries written with `push_to_object`.
    Queue,
}

/// Summary of one named object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object name.
    pub name: String,
    /// Object shape.
    pub kind: ObjectKind,
    /// Live entries (queues) or 1 (single objects).
    pub entry_count: usize,
    /// Blocks making up the current value: tracks of a single object, 1 for queues.
    pub track_count: usize,
    /// Sequence number of the oldest live entry, if any.
    pub head: Option<EntrySeq>,
    /// Sequence number the next push will receive.
    pub tail: EntrySeq,
    /// Maximum number of live entries, `None` for unbounded.
    pub max_capacity: Option<usize>,
    /// Blocks replaced by a later `put` and not yet removed.
    pub superseded: usize,
}

/// Point-in-time counters of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Blocks in Write state.
    pub write_blocks: usize,
    /// Blocks in Idle state.
    pub idle_blocks: usize,
    /// Blocks in Busy state.
    pub busy_blocks: usize,
    /// Blocks in Zombie state (pooled for reuse).
    pub zombie_blocks: usize,
    /// Sum of reader counts over all Busy blocks.
    pub active_readers: u64,
    /// Capacity of every region ever allocated and not yet destroyed.
    pub region_bytes: usize,
    /// Capacity currently sitting in the reuse pool.
    pub pooled_bytes: usize,
    /// Named objects in the directory.
    pub objects: usize,
    /// Live queue entries across all queue objects.
    pub queued_entries: usize,
}

impl StoreStats {
    /// Total blocks known to the registry.
    pub fn total_blocks(&self) -> usize {
        self.write_blocks + self.idle_blocks + self.busy_blocks + self.zombie_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_next_is_strictly_greater() {
        let g = Generation::INITIAL;
        assert!(g.next() > g);
        assert_eq!(g.next(), Generation(2));
    }

    #[test]
    fn test_handle_block_ref() {
        let handle = Handle {
            block_id: BlockId(7),
            generation: Generation(3),
            mode: AccessMode::Read,
            region: RegionDescriptor {
                name: "r7".to_string(),
                capacity: 4096,
            },
            size: 1000,
        };
        assert_eq!(handle.block_ref(), BlockRef::new(BlockId(7), Generation(3)));
        assert_eq!(handle.capacity(), 4096);
        assert_eq!(handle.block_ref().to_string(), "blk-7@g3");
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }

    #[test]
    fn test_stats_total_blocks() {
        let stats = StoreStats {
            write_blocks: 1,
            idle_blocks: 2,
            busy_blocks: 3,
            zombie_blocks: 4,
            ..Default::default()
        };
        assert_eq!(stats.total_blocks(), 10);
    }
}
