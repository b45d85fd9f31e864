//! # Ports Layer
//!
//! - `inbound.rs` - Driving port: the block lifecycle API
//! - `outbound.rs` - Driven port: the shared-memory region capability

pub mod inbound;
pub mod outbound;
