//! Core domain entities for the block registry.
//!
//! A block's owner and reader count live inside its state, so the two
//! coupling rules of the lifecycle hold by construction:
//!
//! - an owner exists exactly when the block is in `Write`
//! - a non-zero reader count exists exactly when the block is `Busy`
//!
//! ```text
//!            create_block            commit
//! [Zombie] ──────────────→ [Write] ─────────→ [Idle] ⇄ [Busy]
//!    ↑                                          │         │
//!    └────────────── delete / force ────────────┴─────────┘
//! ```

pub use shared_types::{
    AccessMode, BlockId, BlockRef, ClientId, Generation, Handle, RegionDescriptor,
};
use std::num::NonZeroU32;

/// Lifecycle state of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// Being written by its owner; invisible to readers.
    Write {
        /// Writer identity.
        owner: ClientId,
    },
    /// Committed and unread.
    Idle,
    /// Committed and held by at least one reader.
    Busy {
        /// Number of outstanding read handles.
        readers: NonZeroU32,
    },
    /// Invisible outside the pool, eligible for reuse.
    Zombie,
}

impl BlockState {
    /// Short lowercase name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Idle => "idle",
            Self::Busy { .. } => "busy",
            Self::Zombie => "zombie",
        }
    }
}

/// Metadata of one shared-memory block.
#[derive(Clone, Debug)]
pub struct Block {
    id: BlockId,
    state: BlockState,
    size: usize,
    region: RegionDescriptor,
    generation: Generation,
}

impl Block {
    /// Creates a freshly allocated block, already in Write for `owner`.
    pub(crate) fn fresh(
        id: BlockId,
        size: usize,
        region: RegionDescriptor,
        owner: ClientId,
    ) -> Self {
        Self {
            id,
            state: BlockState::Write { owner },
            size,
            region,
            generation: Generation::INITIAL,
        }
    }

    /// Block identifier.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BlockState {
        self.state
    }

    /// Logical size requested by the current writer.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size-class capacity of the backing region.
    pub fn capacity(&self) -> usize {
        self.region.capacity
    }

    /// Backing region.
    pub fn region(&self) -> &RegionDescriptor {
        &self.region
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Reference to the block at its current generation.
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.id, self.generation)
    }

    /// Writer identity, set only in Write.
    pub fn owner(&self) -> Option<ClientId> {
        match self.state {
            BlockState::Write { owner } => Some(owner),
            _ => None,
        }
    }

    /// Outstanding read handles (zero unless Busy).
    pub fn reader_count(&self) -> u32 {
        match self.state {
            BlockState::Busy { readers } => readers.get(),
            _ => 0,
        }
    }

    /// True when the block is in the reuse pool.
    pub fn is_zombie(&self) -> bool {
        matches!(self.state, BlockState::Zombie)
    }

    /// Builds a handle for the current generation.
    pub fn handle(&self, mode: AccessMode) -> Handle {
        Handle {
            block_id: self.id,
            generation: self.generation,
            mode,
            region: self.region.clone(),
            size: self.size,
        }
    }

    pub(crate) fn set_state(&mut self, state: BlockState) {
        self.state = state;
    }

    /// Zombie → Write for a new writer; bumps the generation.
    pub(crate) fn revive(&mut self, size: usize, owner: ClientId) {
        debug_assert!(self.is_zombie());
        self.generation = self.generation.next();
        self.size = size;
        self.state = BlockState::Write { owner };
    }
}
