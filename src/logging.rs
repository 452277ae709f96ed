//! Logging setup

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "dakara-player.log";

/// Directory where log files are written
pub fn log_directory() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("dakara").join("logs"))
}

fn filter_for(debug: bool, level: &str) -> EnvFilter {
    if debug {
        // Show all logs including DEBUG
        EnvFilter::new("debug")
    } else {
        // RUST_LOG wins over the configured level
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}

/// Initialize logging to the terminal and to a daily rotated file.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the whole run.
pub fn init_logging(debug: bool, level: &str) -> Option<WorkerGuard> {
    let terminal = fmt::layer()
        .with_target(debug)
        .with_level(true)
        .with_filter(filter_for(debug, level));

    let (file, guard) = match log_directory() {
        Some(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_for(debug, level));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(terminal)
        .with(file)
        .try_init();

    guard
}
