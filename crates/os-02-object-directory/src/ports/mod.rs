//! # Ports Layer
//!
//! - `inbound.rs` - Named object and queue API. Block operations come from
//!   `os_01_block_registry::BlockStoreApi`, which the object store also
//!   implements.

pub mod inbound;
