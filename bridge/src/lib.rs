// Skyflats Bridge
//
// Host side of the skyflats instructions: settings, logging, the Alpaca-backed
// device operations and the `skyflats` command line.

mod alpaca_device_ops;
pub mod cli;
mod error;
mod settings;

pub use alpaca_device_ops::*;
pub use error::*;
pub use settings::*;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Base name of the daily rolling log files
pub const LOG_FILE_NAME: &str = "skyflats.log";

/// Global log directory path
static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Directory logs are written to, if file logging was enabled
pub fn log_directory() -> Option<&'static Path> {
    LOG_DIR.get().map(|p| p.as_path())
}

/// Initialize tracing for the process.
///
/// `RUST_LOG` takes precedence over `default_level`. With a directory, logs go
/// to the console and to a daily rolling file; otherwise to the console only.
/// Console output goes to stderr so results printed on stdout stay parseable.
///
/// The returned guard flushes the file writer when dropped and must be held
/// until the process is done logging.
pub fn init_logging(
    log_directory: Option<&Path>,
    default_level: &str,
    keep_days: i64,
) -> BridgeResult<Option<WorkerGuard>> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_path = match log_directory {
        Some(path) => path,
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| BridgeError::Logging(e.to_string()))?;
            return Ok(None);
        }
    };

    if let Err(e) = std::fs::create_dir_all(log_path) {
        eprintln!("Failed to create log directory: {}", e);
        return init_logging(None, default_level, keep_days);
    }

    LOG_DIR.set(log_path.to_path_buf()).ok();

    let console_layer = fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr);
    let (file_layer, guard) = file_layer(log_path);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BridgeError::Logging(e.to_string()))?;

    tracing::debug!("File logging to {}", log_path.display());

    let removed = cleanup_old_logs(log_path, keep_days, chrono::Local::now().date_naive());
    if removed > 0 {
        tracing::debug!("Removed {} old log files", removed);
    }

    Ok(Some(guard))
}

/// Plain-text layer writing to the daily rolling file in `log_path`
fn file_layer<S>(log_path: &Path) -> (impl Layer<S>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let file_appender = tracing_appender::rolling::daily(log_path, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);
    (layer, guard)
}

/// Delete rolled log files older than `keep_days`, returning how many were removed
fn cleanup_old_logs(log_dir: &Path, keep_days: i64, today: chrono::NaiveDate) -> usize {
    let cutoff = today - chrono::Duration::days(keep_days.max(0));
    let prefix = format!("{}.", LOG_FILE_NAME);

    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read log directory for cleanup: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        // Parse date from filename like "skyflats.log.2024-01-15"
        let date_str = match name.strip_prefix(&prefix) {
            Some(s) => s,
            None => continue,
        };

        let file_date = match chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => continue,
        };

        if file_date < cutoff {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to delete old log file {:?}: {}", path, e);
            } else {
                removed += 1;
            }
        }
    }
    removed
}
