//! Logging initialization and configuration.
//!
//! Logs are written to files so they never interleave with the confirmation
//! prompt on the terminal. Each run gets its own timestamped file.
//!
//! # Configuration
//!
//! The log level can be controlled via the `RUST_LOG` environment variable:
//! - `RUST_LOG=debug` - Show debug and higher level logs (includes every validation)
//! - `RUST_LOG=info` - Show info and higher level logs (default)
//! - `RUST_LOG=audit=info,warn` - Keep audit records, otherwise warnings only

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log directory: `~/.rusty-gate/logs`.
pub fn default_log_dir() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".rusty-gate").join("logs")
}

/// Initialize the logging system.
///
/// Each run creates a new log file with a timestamp, e.g.:
/// `logs/rusty-gate.2024-12-06-14-30-25.log`
///
/// The log level is controlled by the `RUST_LOG` environment variable,
/// defaulting to `info` if not set. Failing to set up the file is reported on
/// stderr and leaves logging disabled.
pub fn init_logging(log_dir: &Path) {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        return;
    }

    let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let log_path = log_dir.join(format!("rusty-gate.{}.log", timestamp));

    let log_file = match fs::File::create(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: Failed to create log file: {}", e);
            return;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)  // audit records use the "audit" target
        .with_thread_ids(true)
        .with_line_number(true);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    // Keep the non-blocking writer alive for the whole process
    std::mem::forget(guard);

    tracing::info!("Logging initialized - writing to {}", log_path.display());
}
