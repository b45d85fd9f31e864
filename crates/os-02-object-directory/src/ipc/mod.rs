//! # IPC Layer
//!
//! Turns control-plane envelopes into object store calls.

mod handler;

pub use handler::ControlPlaneHandler;
