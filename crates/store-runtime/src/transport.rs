//! # Unix Socket Transport
//!
//! Carries control-plane envelopes between processes on one host.
//!
//! ```text
//! ┌────────────┬────────────────────────────────────┐
//! │ u32 LE len │ bincode RequestEnvelope / Response │
//! └────────────┴────────────────────────────────────┘
//! ```
//!
//! Every connection gets its own task, which forwards each decoded request
//! to the `ServerHandle` and writes the reply back. Requests from all
//! connections still meet at the single server task, so the socket adds no
//! concurrency to the store itself. A connection that sends an undecodable
//! or oversized frame is dropped; the others keep going.

use crate::client::StoreClient;
use crate::server::{ControlChannel, ServerHandle};
use async_trait::async_trait;
use os_01_block_registry::RegionProvider;
use shared_types::{RequestEnvelope, ResponseEnvelope, StoreError};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest frame either side accepts.
pub const MAX_FRAME: usize = 16 << 20;

/// Socket and framing failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("envelope encoding failed: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if bytes.len() > MAX_FRAME {
        return Err(TransportError::FrameTooLarge {
            len: bytes.len(),
            max: MAX_FRAME,
        });
    }
    writer.write_u32_le(bytes.len() as u32).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame. `None` means the peer closed the
/// connection between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME,
        });
    }
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

// =============================================================================
// SERVER SIDE
// =============================================================================

/// Accepts client connections on a Unix socket and feeds a running server.
pub struct SocketServer {
    listener: UnixListener,
    path: PathBuf,
    server: ServerHandle,
}

impl SocketServer {
    /// Binds `path`, replacing a socket file left behind by an earlier run.
    pub fn bind(path: impl Into<PathBuf>, server: ServerHandle) -> Result<Self, TransportError> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            listener,
            path,
            server,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serves connections until the control-plane server stops, then
    /// removes the socket file.
    pub async fn run(self) {
        info!(socket = %self.path.display(), "control socket listening");
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let server = self.server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, server).await {
                                warn!(error = %e, "control connection dropped");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = self.server.closed() => break,
            }
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(socket = %self.path.display(), error = %e, "socket file not removed");
        }
        info!(socket = %self.path.display(), "control socket closed");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    server: ServerHandle,
) -> Result<(), TransportError> {
    while let Some(frame) = read_frame(&mut stream).await? {
        let envelope = RequestEnvelope::from_bytes(&frame)?;
        let response = match server.call(envelope).await {
            Ok(response) => response,
            // Server stopped: closing the connection tells the client.
            Err(_) => return Ok(()),
        };
        write_frame(&mut stream, &response.to_bytes()?).await?;
    }
    Ok(())
}

// =============================================================================
// CLIENT SIDE
// =============================================================================

/// A connection to a `SocketServer`. Calls on one channel are sent one at
/// a time; open several channels for parallel requests.
#[derive(Debug)]
pub struct SocketChannel {
    stream: Mutex<UnixStream>,
}

impl SocketChannel {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl ControlChannel for SocketChannel {
    async fn call(&self, envelope: RequestEnvelope) -> Result<ResponseEnvelope, StoreError> {
        let bytes = envelope
            .to_bytes()
            .map_err(|e| StoreError::invalid_state("request envelope", e.to_string()))?;
        let mut stream = self.stream.lock().await;
        let reply = match write_frame(&mut *stream, &bytes).await {
            Ok(()) => read_frame(&mut *stream).await,
            Err(e) => Err(e),
        };
        match reply {
            Ok(Some(frame)) => ResponseEnvelope::from_bytes(&frame)
                .map_err(|e| StoreError::invalid_state("response envelope", e.to_string())),
            Ok(None) => Err(StoreError::ServerUnavailable),
            Err(e) => {
                debug!(error = %e, "control socket failed");
                Err(StoreError::ServerUnavailable)
            }
        }
    }
}

impl<R: RegionProvider> StoreClient<SocketChannel, R> {
    /// Connects to the server listening on `path`. `regions` must map the
    /// same region namespace as the server's provider.
    pub async fn connect(path: impl AsRef<Path>, regions: R) -> Result<Self, TransportError> {
        Ok(Self::new(SocketChannel::connect(path).await?, regions))
    }
}
