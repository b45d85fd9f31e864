//! Cross-crate integration scenarios.

pub mod clients;
pub mod fuzz;
pub mod lifecycle;
pub mod queues;
