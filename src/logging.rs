//! Logging setup for both binaries
//!
//! The deck process logs to stderr and, when configured, to a log file in its
//! own directory that is truncated on every start. The companion process logs
//! plain lines to stderr, which the supervisor forwards into the deck's log.
//! `RUST_LOG` always overrides the configured filter.

use crate::config::LoggingConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the file writer alive; dropping it flushes the log file
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// `RUST_LOG` if set and valid, else the configured directives
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Create `dir` if needed and empty the log file inside it
pub fn prepare_log_file(dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, "")?;
    Ok(path)
}

/// Initialise logging for the deck process
pub fn init_deck_logging(config: &LoggingConfig, log_dir: &Path) -> io::Result<LoggingGuard> {
    let (file_layer, file_guard) = match config.file_name.as_deref() {
        Some(name) => {
            prepare_log_file(log_dir, name)?;
            let appender = tracing_appender::rolling::never(log_dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.filter))
        .with(file_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Initialise logging for the companion process
///
/// No timestamps: each line is re-logged by the deck process.
pub fn init_service_logging(filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false)
                .without_time(),
        )
        .init();
}
