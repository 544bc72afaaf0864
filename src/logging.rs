//! Logging init: a file under the XDG state dir for the terminal UI, stderr otherwise.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const VERBOSE_FILTER: &str = "info,fastspeed=debug";

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_FILTER
        } else {
            DEFAULT_FILTER
        })
    })
}

/// Log to `~/.local/state/fastspeed/fastspeed.log`. The terminal UI owns the
/// screen, so it must not log to stderr.
///
/// Returns Err if the log file can't be opened so the caller can fall back.
pub fn init_file_logging(verbose: bool) -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fastspeed")?;
    let log_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&log_dir)?;
    let path = log_dir.join("fastspeed.log");

    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!("logging to {}", path.display());
    Ok(path)
}

/// Log to stderr. Used by plain mode and when file logging can't start.
pub fn init_stderr_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .try_init();
}
