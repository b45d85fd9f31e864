//! # Control-Plane Server
//!
//! A single task owns the `ControlPlaneHandler` and drains a bounded
//! `mpsc` channel. Each request is applied to completion before the next
//! one is received, which makes every metadata operation linearizable
//! without any locking inside the store.
//!
//! ```text
//! StoreClient ──RequestEnvelope──→ mpsc ──→ server task ──→ ControlPlaneHandler
//!      ↑                                         │
//!      └──────────── oneshot::Sender ←───────────┘ ResponseEnvelope
//! ```
//!
//! The server never touches payload bytes; it only hands out region
//! descriptors.

use async_trait::async_trait;
use os_01_block_registry::RegionProvider;
use os_02_object_directory::{ControlPlaneHandler, ObjectStoreApi};
use shared_types::{ControlResponse, RequestEnvelope, ResponseEnvelope, StoreError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Anything that can carry a request envelope to the control plane and
/// bring back its response.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Sends one request and waits for its response.
    async fn call(&self, envelope: RequestEnvelope) -> Result<ResponseEnvelope, StoreError>;
}

/// Messages accepted by the server task.
#[derive(Debug)]
pub enum ServerMessage {
    /// A control-plane request.
    Request {
        envelope: RequestEnvelope,
        reply: oneshot::Sender<ResponseEnvelope>,
    },
    /// Stop serving, destroy every region and report how many were destroyed.
    Shutdown { reply: oneshot::Sender<usize> },
}

/// Cloneable sender side of a running server.
#[derive(Clone, Debug)]
pub struct ServerHandle {
    sender: mpsc::Sender<ServerMessage>,
}

impl ServerHandle {
    /// Stops the server. Requests queued behind the shutdown are dropped,
    /// so their callers see `ServerUnavailable`.
    pub async fn shutdown(&self) -> Result<usize, StoreError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ServerMessage::Shutdown { reply })
            .await
            .map_err(|_| StoreError::ServerUnavailable)?;
        response.await.map_err(|_| StoreError::ServerUnavailable)
    }

    /// Whether the server task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the server task has stopped receiving.
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

#[async_trait]
impl ControlChannel for ServerHandle {
    async fn call(&self, envelope: RequestEnvelope) -> Result<ResponseEnvelope, StoreError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ServerMessage::Request { envelope, reply })
            .await
            .map_err(|_| StoreError::ServerUnavailable)?;
        response.await.map_err(|_| StoreError::ServerUnavailable)
    }
}

/// The serialization point of the store.
pub struct ControlPlaneServer<R: RegionProvider> {
    handler: ControlPlaneHandler<R>,
    receiver: mpsc::Receiver<ServerMessage>,
}

impl<R: RegionProvider + 'static> ControlPlaneServer<R> {
    /// Creates a server and the handle that feeds it.
    pub fn new(handler: ControlPlaneHandler<R>, queue_depth: usize) -> (Self, ServerHandle) {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        (Self { handler, receiver }, ServerHandle { sender })
    }

    /// Spawns the server on the current tokio runtime.
    ///
    /// The task resolves to the number of regions destroyed at shutdown.
    pub fn spawn(
        handler: ControlPlaneHandler<R>,
        queue_depth: usize,
    ) -> (ServerHandle, JoinHandle<usize>) {
        let (server, handle) = Self::new(handler, queue_depth);
        (handle, tokio::spawn(server.run()))
    }

    /// Serves until a shutdown message arrives or every handle is dropped,
    /// then destroys every region.
    pub async fn run(mut self) -> usize {
        info!("control-plane server started");
        let mut shutdown_reply = None;

        while let Some(message) = self.receiver.recv().await {
            match message {
                ServerMessage::Request { envelope, reply } => {
                    let response = self.apply(envelope);
                    if reply.send(response).is_err() {
                        debug!("caller went away before its response was sent");
                    }
                }
                ServerMessage::Shutdown { reply } => {
                    shutdown_reply = Some(reply);
                    break;
                }
            }
        }

        self.receiver.close();
        let destroyed = self.handler.shutdown();
        store_telemetry::record_stats(&self.handler.store().store_stats());
        info!(destroyed, "control-plane server stopped");

        if let Some(reply) = shutdown_reply {
            if reply.send(destroyed).is_err() {
                warn!("shutdown requester went away");
            }
        }
        destroyed
    }

    fn apply(&mut self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let operation = envelope.request.operation();
        let response = {
            let _timer = store_telemetry::request_timer(operation);
            self.handler.handle(envelope)
        };
        let rejection = response.result.as_ref().err().map(StoreError::kind);
        store_telemetry::record_request(operation, rejection);

        if let Ok(ControlResponse::Stats(stats)) = &response.result {
            store_telemetry::record_stats(stats);
        }
        response
    }
}
