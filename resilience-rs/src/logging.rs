//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: env-filtered, JSON or text on
//! stdout, plus an optional daily-rolling file. `log` records are bridged in.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::types::{Error, ErrorKind, Result};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name, also the log file prefix
    pub service_name: String,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Directory for rolling log files; no file output when unset
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "inference-gateway".to_string(),
            json_format: false,
            log_dir: None,
        }
    }
}

/// Initializes the structured logging system
///
/// Returns the file writer guard when file output is enabled; keep it alive
/// for the lifetime of the process so buffered lines are flushed.
pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(None);
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
    });
    let text_layer = (!config.json_format).then(|| fmt::layer().with_target(true));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
            Error::new(ErrorKind::Initialization, format!("Failed to set global subscriber: {}", e))
        })?;

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        file_output = config.log_dir.is_some(),
        "Structured logging initialized"
    );

    Ok(guard)
}
