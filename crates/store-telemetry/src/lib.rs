//! # Store Telemetry
//!
//! Logging and metrics for the object store.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry, plain or JSON lines on stderr
//! - **Metrics**: Prometheus counters and gauges on a private registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use store_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OS_SERVICE_NAME` | `object-store` | Service name in the startup log |
//! | `OS_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `OS_CONSOLE_OUTPUT` | `true` | Write logs to stderr |
//! | `OS_JSON_LOGS` | `false` | JSON lines instead of plain text |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, record_request, record_stats, register_metrics, request_timer, HistogramTimer,
    ACTIVE_READERS, BLOCKS, OBJECTS, POOLED_BYTES, QUEUED_ENTRIES, REGION_BYTES, REGISTRY,
    REJECTIONS, REQUESTS, REQUEST_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Registers metrics, then installs the global log subscriber.
///
/// Returns a guard to hold for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active. Logs a final line on drop.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
