//! Logging infrastructure for pipeline runs.
//!
//! Two layers:
//! - Process-wide diagnostics through `tracing` (stderr or daily-rotated file)
//! - Per-run logs through [`RunLogger`]: append-only files with a bounded
//!   in-memory tail and optional live callback

pub mod run_logger;
pub mod types;

pub use run_logger::{log_path_for, read_log_tail, RunLogger};
pub use types::{LogCallback, LogConfig, LogEntry, LogLevel, MessagePrefix};

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize process-wide tracing to stderr.
///
/// Respects `RUST_LOG` when set, otherwise uses the provided level.
pub fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Initialize tracing with an additional daily-rotated log file.
///
/// Returns the appender guard; drop it only at shutdown or buffered lines
/// are lost.
pub fn init_tracing_to_file(
    level: LogLevel,
    log_dir: impl AsRef<Path>,
) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir.as_ref(), "atelier.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    guard
}
