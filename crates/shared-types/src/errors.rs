//! # Error Types
//!
//! The error taxonomy returned by every control-plane operation.
//!
//! Every operation validates before it mutates, so receiving any of these
//! errors means the store is exactly as it was before the request.

use crate::entities::{BlockId, ClientId, Generation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the control plane and the client library.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StoreError {
    /// Unknown block, Zombie block, unknown name or missing entry.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The target exists but is in the wrong state for this operation.
    #[error("Invalid state for {resource}: {reason}")]
    InvalidState { resource: String, reason: String },

    /// Caller is not the owner of a block in Write state.
    #[error("Invalid owner: {caller} does not own {block_id}")]
    InvalidOwner { block_id: BlockId, caller: ClientId },

    /// Non-force delete of a block that still has readers.
    #[error("Block {block_id} is busy with {readers} reader(s)")]
    Busy { block_id: BlockId, readers: u32 },

    /// The presented generation has been superseded by reuse or deletion.
    #[error("Stale generation for {block_id}: presented {presented}, current {current}")]
    StaleGeneration {
        block_id: BlockId,
        presented: Generation,
        current: Generation,
    },

    /// Neither the reuse pool nor the backing allocator can satisfy a request.
    #[error("Exhausted: cannot provide {requested} bytes ({reason})")]
    Exhausted { requested: usize, reason: String },

    /// Release would drive the reader count below zero.
    #[error("Double release on {block_id}")]
    DoubleRelease { block_id: BlockId },

    /// An object with this name already exists.
    #[error("Object already exists: {name}")]
    AlreadyExists { name: String },

    /// The shared-memory capability failed (create, map, unmap, destroy).
    #[error("Region error: {message}")]
    Region { message: String },

    /// Client side: the control-plane server is not reachable anymore.
    #[error("Control-plane server unavailable")]
    ServerUnavailable,
}

impl StoreError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Shorthand for an `InvalidState` error.
    pub fn invalid_state(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Stable, low-cardinality name of the error kind (metrics label).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidOwner { .. } => "invalid_owner",
            Self::Busy { .. } => "busy",
            Self::StaleGeneration { .. } => "stale_generation",
            Self::Exhausted { .. } => "exhausted",
            Self::DoubleRelease { .. } => "double_release",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Region { .. } => "region",
            Self::ServerUnavailable => "server_unavailable",
        }
    }
}
