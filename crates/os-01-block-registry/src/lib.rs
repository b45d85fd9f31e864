//! # Block Registry (os-01)
//!
//! The authoritative table of shared-memory blocks, their lifecycle state
//! machine and the size-classed pool that recycles deleted blocks.
//!
//! ## Block Lifecycle
//!
//! ```text
//!                 create_block (reuse or new region)
//!   [Zombie] ─────────────────────────────→ [Write]  (owner set)
//!      ↑                                       │ commit (owner only)
//!      │ delete (Idle) / delete force (Busy)   ↓
//!      ├─────────────────────────────────── [Idle] ←──────┐
//!      │                                       │ request   │ last release
//!      │                                       ↓           │
//!      └─────────────────────────────────── [Busy] ───────┘
//! ```
//!
//! ## Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | Owner set exactly in Write | `BlockState::Write { owner }` |
//! | Readers > 0 exactly in Busy | `BlockState::Busy { readers: NonZeroU32 }` |
//! | Generation grows on every reuse | `Block::revive` |
//! | Rejected calls mutate nothing | validate-then-apply in `BlockRegistry` |
//! | Every Zombie is pooled exactly once | `BlockStore::verify_integrity` |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Block entity, registry, reuse pool, pool config
//! - `ports/` - `BlockStoreApi` (inbound), `RegionProvider` (outbound)
//! - `adapters/region/` - heap and mmap region providers
//! - `service.rs` - `BlockStore`, wiring the above together
//!
//! ## Usage
//!
//! ```ignore
//! use os_01_block_registry::{BlockStore, BlockStoreApi, InMemoryRegionProvider, PoolConfig};
//!
//! let mut store = BlockStore::new(InMemoryRegionProvider::new(), PoolConfig::default())?;
//! let handle = store.create_block(1000, owner)?;
//! // ... write through a mapped view of handle.region ...
//! store.commit(handle.block_ref(), owner)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::region::InMemoryRegionProvider;
#[cfg(feature = "mmap")]
pub use adapters::region::MmapRegionProvider;
pub use domain::{Block, BlockRegistry, BlockState, PoolConfig, StateCounts, ZombiePool};
pub use ports::inbound::BlockStoreApi;
pub use ports::outbound::{RegionError, RegionMemory, RegionProvider, RegionView};
pub use service::BlockStore;
