//! Domain layer for named objects and queues.

pub mod directory;
pub mod queue;

pub use directory::{BlockLocation, ObjectDirectory, ObjectEntry, Slot};
pub use queue::{QueueEntry, QueueState};
