//! File logging. The terminal belongs to the UI, so nothing is written to stdout.
//!
//! Filter with `RUST_LOG`, e.g. `RUST_LOG=namesort::editor=debug`. Defaults to `info`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_PREFIX: &str = "namesort";

/// Installs the global subscriber writing to `<log_dir>/namesort.log`.
/// The returned guard flushes the log when dropped.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    let appender = match RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
    {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: Could not initialize file logging: {}", e);
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(ErrorLayer::default())
        .init();

    tracing::info!("Logging to {}", log_dir.join(format!("{LOG_FILE_PREFIX}.log")).display());
    Some(guard)
}
