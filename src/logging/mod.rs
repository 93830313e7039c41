//! Structured logging for the monitoring engine
//!
//! Console output is compact text; the file copy is JSON, rotated daily under
//! `<config dir>/lanpulse/logs/`.

pub mod macros;

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const APP_DIR: &str = "lanpulse";
const LOG_FILE_PREFIX: &str = "lanpulse.log";

/// Install the global subscriber and return the log directory
///
/// `RUST_LOG` overrides the default `info` filter, e.g.
/// `RUST_LOG=lanpulse=debug`. Calling this when a subscriber is
/// already installed (tests, an embedding application) is not an error.
pub fn init_logging() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .json();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = init_result {
        if e.to_string().contains("already been set") {
            return Ok(log_dir);
        }
        return Err(Box::new(e));
    }

    crate::log_info!("Logging initialized. Log directory: {}", log_dir.display());

    Ok(log_dir)
}

/// `%LOCALAPPDATA%\lanpulse\logs` on Windows, `~/.config/lanpulse/logs` elsewhere
pub fn log_directory() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir().ok_or("Could not find local data directory")?
    } else {
        dirs::config_dir().ok_or("Could not find config directory")?
    };

    Ok(base_dir.join(APP_DIR).join("logs"))
}

/// Today's log file
pub fn current_log_file() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    Ok(log_directory()?.join(format!("{}.{}", LOG_FILE_PREFIX, today)))
}
