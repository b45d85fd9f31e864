//! # Object Store Runtime
//!
//! The moving parts around the control plane: the server task that
//! serializes every metadata request, the client library processes link
//! against, and the configuration and locking the executable needs.
//!
//! ## Modules
//!
//! - `server` - `ControlPlaneServer`, `ServerHandle`, `ControlChannel`
//! - `client` - `StoreClient`: composite operations, shared fair locking
//! - `mapped` - `MappedBlock`: in-place reads of a block's bytes
//! - `payload` - array and opaque payload encoding
//! - `transport` - Unix socket server and `SocketChannel`
//! - `config` - `RuntimeConfig::from_env`
//! - `lock` - one server per region directory
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load configuration
//! 3. Lock the region directory
//! 4. Spawn the server over an mmap region provider
//! 5. Listen on the control socket
//! 6. Serve until Ctrl+C, then destroy every region

pub mod client;
pub mod config;
pub mod lock;
pub mod mapped;
pub mod payload;
pub mod server;
#[cfg(unix)]
pub mod transport;

pub use client::{ClientError, StoreClient};
pub use config::{ConfigError, RuntimeConfig};
pub use lock::{DirectoryLock, LockError};
pub use mapped::MappedBlock;
pub use payload::{DType, Payload, PayloadError, PayloadView};
pub use server::{ControlChannel, ControlPlaneServer, ServerHandle, ServerMessage};
#[cfg(unix)]
pub use transport::{SocketChannel, SocketServer, TransportError};
