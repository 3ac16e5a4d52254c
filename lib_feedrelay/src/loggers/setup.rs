//! # Setup Logging
//!
//! Installs the global `tracing` subscriber:
//! - filter from `RUST_LOG`, falling back to the configured level;
//! - human-readable console output with ANSI colours and targets;
//! - JSON lines to a daily rotating file under `log_dir`.
//!
//! The returned [`WorkerGuard`] flushes the file writer when dropped, so the
//! caller keeps it alive for as long as the process logs.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds and installs the subscriber. Fails if one is already installed.
pub fn setup_logging(log_dir: &Path, file_prefix: &str, log_level: &str) -> io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, file_prefix);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::info!(level = log_level, dir = %log_dir.display(), "logging initialized");
    Ok(guard)
}
