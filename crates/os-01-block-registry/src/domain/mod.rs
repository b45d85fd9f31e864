//! Domain layer for the block registry.

pub mod config;
pub mod entities;
pub mod pool;
pub mod registry;

pub use config::PoolConfig;
pub use entities::{Block, BlockState};
pub use pool::ZombiePool;
pub use registry::{BlockRegistry, StateCounts};
