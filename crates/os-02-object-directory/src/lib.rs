//! # Object Directory (os-02)
//!
//! Named objects and FIFO queues on top of the block registry, and the
//! dispatcher that turns control-plane requests into calls on them.
//!
//! ## Object Shapes
//!
//! | Shape | Write | Read | Reclaim |
//! |-------|-------|------|---------|
//! | Single | `put`, `put_tracks` (replace the value) | `get`, `get_tracks` | `remove_object` |
//! | Queue | `push_to_object` | `pop_from_object`, `read_from_object`, `read_latest_from_object`, `batch_read_from_object` | `free_handle`, `delete_entry`, `remove_object` |
//!
//! Deletion is always explicit. A superseded head stays alive until the
//! object is removed; a popped entry stays alive until its last reader is
//! gone.
//!
//! ## Crate Structure
//!
//! - `domain/` - directory map, reverse index, queue state
//! - `ports/` - `ObjectStoreApi`
//! - `service.rs` - `ObjectStore`, validate-then-apply over the block store
//! - `ipc/` - `ControlPlaneHandler`, envelope dispatch

pub mod domain;
pub mod ipc;
pub mod ports;
pub mod service;

pub use domain::{BlockLocation, ObjectDirectory, ObjectEntry, QueueEntry, QueueState, Slot};
pub use ipc::ControlPlaneHandler;
pub use ports::inbound::ObjectStoreApi;
pub use service::ObjectStore;
