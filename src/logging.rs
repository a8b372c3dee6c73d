//! Logging setup
//!
//! The TUI owns the terminal, so in dashboard mode logs go to a file under
//! the user's data directory. Headless runs log to stderr.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides every other log level setting
pub const LOG_ENV: &str = "AEGIS_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

pub fn log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("aegis").join("aegis.log"))
}

/// Pick the filter: `AEGIS_LOG`, then `--debug`, then the configured level
pub fn filter_directive(env: Option<&str>, debug: bool, configured: &str) -> String {
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directive) => directive.to_string(),
        None if debug => "debug".to_string(),
        None => configured.to_string(),
    }
}

/// Install the global subscriber. Returns the log file path in file mode.
pub fn init(directive: &str, target: LogTarget) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;
            Ok(None)
        }
        LogTarget::File => {
            let path = log_path().context("Could not determine data directory for the log file")?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {:?}", parent))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;
            Ok(Some(path))
        }
    }
}
