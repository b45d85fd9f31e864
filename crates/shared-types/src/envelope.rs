//! # Request/Response Envelopes
//!
//! The wrapper around every control-plane message.
//!
//! ## Properties
//!
//! - **Versioning**: requests carry a `version` checked by the server.
//! - **Correlation**: responses echo the request's `correlation_id`.
//! - **Envelope Identity**: `sender` is the sole source of caller identity.
//!
//! `to_bytes`/`from_bytes` give a compact bincode encoding for transports
//! that move envelopes between processes.

use crate::entities::ClientId;
use crate::errors::StoreError;
use crate::ipc::{ControlRequest, ControlResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A control-plane request with its routing header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Protocol version; must equal `CURRENT_VERSION`.
    pub version: u16,
    /// Unique id echoed by the response.
    pub correlation_id: Uuid,
    /// Identity of the calling client.
    pub sender: ClientId,
    /// The request itself.
    pub request: ControlRequest,
}

impl RequestEnvelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Wraps a request from `sender` with a fresh correlation id.
    pub fn new(sender: ClientId, request: ControlRequest) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            correlation_id: Uuid::new_v4(),
            sender,
            request,
        }
    }

    /// Encodes the envelope for a byte transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decodes an envelope produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// The reply to one `RequestEnvelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id of the request being answered.
    pub correlation_id: Uuid,
    /// Outcome of the request.
    pub result: Result<ControlResponse, StoreError>,
}

impl ResponseEnvelope {
    /// Encodes the envelope for a byte transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decodes an envelope produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
