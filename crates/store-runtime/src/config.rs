//! # Runtime Configuration
//!
//! Everything the executable needs besides logging, read from the
//! environment with defaults for every value.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OS_SHM_DIR` | `/dev/shm/object-store` | Directory holding region files |
//! | `OS_MIN_CLASS` | `64` | Smallest size class in bytes |
//! | `OS_MAX_BLOCK` | `1073741824` | Largest accepted block size |
//! | `OS_POOL_BYTES` | unlimited | Budget for all regions together |
//! | `OS_REQUEST_QUEUE` | `1024` | Depth of the server's request channel |
//! | `OS_SOCKET` | `$OS_SHM_DIR/control.sock` | Control socket clients connect to |

use os_01_block_registry::PoolConfig;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("{var}={value:?} is invalid: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory for region files and the server lock.
    pub shm_dir: PathBuf,
    /// Size classes and budget of the block pool.
    pub pool: PoolConfig,
    /// Requests buffered before senders wait.
    pub request_queue: usize,
    /// Unix socket serving the control plane to other processes.
    pub socket_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let shm_dir = default_shm_dir();
        Self {
            socket_path: shm_dir.join(SOCKET_FILE),
            shm_dir,
            pool: PoolConfig::default(),
            request_queue: 1024,
        }
    }
}

const SOCKET_FILE: &str = "control.sock";

fn default_shm_dir() -> PathBuf {
    let shm = PathBuf::from("/dev/shm");
    if shm.is_dir() {
        shm.join("object-store")
    } else {
        std::env::temp_dir().join("object-store")
    }
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            reason: e.to_string(),
            value,
        })
}

impl RuntimeConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads variables through `lookup`, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("OS_SHM_DIR") {
            config.shm_dir = PathBuf::from(dir);
        }
        config.socket_path = match lookup("OS_SOCKET") {
            Some(path) => PathBuf::from(path),
            None => config.shm_dir.join(SOCKET_FILE),
        };
        if let Some(value) = lookup("OS_MIN_CLASS") {
            config.pool.min_class_size = parse("OS_MIN_CLASS", value)?;
        }
        if let Some(value) = lookup("OS_MAX_BLOCK") {
            config.pool.max_block_size = parse("OS_MAX_BLOCK", value)?;
        }
        if let Some(value) = lookup("OS_POOL_BYTES") {
            config.pool.max_pool_bytes = match value.trim().to_lowercase().as_str() {
                "" | "none" | "unlimited" => None,
                _ => Some(parse("OS_POOL_BYTES", value)?),
            };
        }
        if let Some(value) = lookup("OS_REQUEST_QUEUE") {
            let depth: usize = parse("OS_REQUEST_QUEUE", value.clone())?;
            if depth == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "OS_REQUEST_QUEUE",
                    value,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.request_queue = depth;
        }

        config
            .pool
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                var: "OS_MIN_CLASS",
                value: config.pool.min_class_size.to_string(),
                reason: e.to_string(),
            })?;
        Ok(config)
    }
}
