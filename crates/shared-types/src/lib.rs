//! # Shared Types Crate
//!
//! Types shared by every crate of the object store: block and client
//! identifiers, the `Handle` capability, the `StoreError` taxonomy and the
//! control-plane request/response envelopes.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every cross-crate type is defined here.
//! - **Envelope Identity**: requests never carry a caller id in the payload;
//!   the envelope's `sender` is authoritative for ownership checks.
//! - **Metadata Only**: nothing in this crate carries payload bytes. A
//!   handle names a region, it never contains one.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod ipc;

pub use entities::*;
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use errors::*;
pub use ipc::*;
