//! Structured logging setup.
//!
//! Every search, API fetch and image fetch is logged through `tracing` with
//! structured fields. Output goes to the terminal and, when enabled, to a
//! daily rolling file in either JSON or line format.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime},
    prelude::*,
    EnvFilter, Layer,
};

use crate::booru::config_loader::Logging;

/// Name of the rolling log file.
pub const LOG_FILE_NAME: &str = "image_search.log";

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so it has to be
/// held for as long as the program runs. `RUST_LOG` overrides the configured
/// level.
pub fn init_logging(settings: &Logging, log_dir: &Path) -> LoggerResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .boxed();

    let (file_layer, guard) = if settings.log_to_file {
        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir)?;
        }

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = match settings.log_format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
            _ => fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(FmtSpan::CLOSE)
                .boxed(),
        };

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(terminal_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    info!(
        log_format = %settings.log_format,
        log_level = %settings.log_level,
        log_to_file = settings.log_to_file,
        "Logger initialized"
    );

    Ok(guard)
}
