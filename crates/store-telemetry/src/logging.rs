//! Structured logging.
//!
//! A `tracing-subscriber` registry with an `EnvFilter` and either a
//! human-readable or a JSON formatting layer. Every crate in the workspace
//! logs through `tracing` macros with structured fields:
//!
//! - `block_id`, `generation`: the block a transition applies to
//! - `object`, `seq`: the named object and queue entry involved
//! - `operation`, `kind`: request name and error kind on rejections

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// Fails if the filter directive does not parse or a global subscriber is
/// already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log filter '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match (config.console_output, config.json_logs) {
        (true, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        (true, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        (false, _) => registry.try_init(),
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "logging initialized"
    );
    Ok(())
}

/// Log a block lifecycle event with the standard block fields.
///
/// ```rust,ignore
/// log_block_event!(debug, "block committed", handle.block_ref(), size = handle.size);
/// ```
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $msg:expr, $block_ref:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            block_id = %$block_ref.block_id,
            generation = %$block_ref.generation,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a named-object event with the standard object fields.
#[macro_export]
macro_rules! log_object_event {
    ($level:ident, $msg:expr, $name:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            object = %$name,
            $($($field)*,)?
            $msg
        )
    };
}
