//! Subscriber setup for binaries and tests that embed the library.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber: an `EnvFilter` (`RUST_LOG` wins over the
/// configured level) and either a human or a JSON formatter. `log` records
/// are forwarded through `LogTracer`.
///
/// Returns `Ok(false)` when logging was already initialised.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer().json().with_current_span(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let subscriber = Registry::default().with(output).with(filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))?;
    LogTracer::init().map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialised");
    Ok(true)
}
