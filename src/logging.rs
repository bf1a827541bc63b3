//! Tracing configuration and log routing.
//!
//! Indexing runs log to stdout using a compact formatter and, when possible, to a file. When
//! `RUSTY_INDEX_LOG_FILE` is set, logs are appended to that path; otherwise a file logger is
//! created under `logs/rusty-index.log`.
//!
//! The non-blocking file writer flushes when its guard drops; callers keep the returned guard
//! alive until exit.
use std::path::PathBuf;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "RUSTY_INDEX_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rusty-index.log";

/// Configure tracing subscribers for stdout and optional file logging.
///
/// Respects `RUST_LOG` for filtering (defaults to `info`). Returns the file writer guard when a
/// file layer was installed.
pub fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match configure_file_writer() {
        Some((writer, guard)) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn log_file_target() -> PathBuf {
    std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

/// Open the log file in append mode, creating parent directories as needed.
fn configure_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let path = log_file_target();
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
