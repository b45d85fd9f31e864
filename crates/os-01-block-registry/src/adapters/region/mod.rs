//! Shared-memory region providers.
//!
//! - `memory` - process-local heap regions (tests, single-process embedding)
//! - `mmap` - file-backed shared mappings, visible to every process that can
//!   open the region directory

pub mod memory;
#[cfg(feature = "mmap")]
pub mod mmap;

pub use memory::InMemoryRegionProvider;
#[cfg(feature = "mmap")]
pub use mmap::MmapRegionProvider;
