//! Event logging: a timestamped append-only file per server run under the
//! log directory, with a `log` symlink pointing at the current one, wired
//! into `tracing`.

use crate::config::Config;
use crate::error::{AppResult, InfraError};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Open the run's log file and install the tracing subscriber. With `debug`
/// set, log lines also go to stderr and the process stays chatty.
pub fn init(config: &Config, debug: bool) -> AppResult<PathBuf> {
    std::fs::create_dir_all(&config.log_dir).map_err(InfraError::Io)?;
    let name = Local::now().format("%y%m%d-%H%M%S").to_string();
    let path = config.log_dir.join(&name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(InfraError::Io)?;

    // Keep a stable name pointing at the current log.
    let _ = std::fs::remove_file("log");
    #[cfg(unix)]
    let _ = std::os::unix::fs::symlink(&path, "log");

    color_eyre::install().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,parley=info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(std::sync::Mutex::new(file));
    let stderr_layer = debug.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .with(ErrorLayer::default())
        .init();

    eprintln!("Logging on \"{}\".", path.display());
    Ok(path)
}
