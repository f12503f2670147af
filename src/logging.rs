//! Tracing initialisation
//!
//! Call [`init_logging`] once at program start. Console output honours
//! `RUST_LOG` and otherwise uses the level picked from the verbosity flags.
//! The run log file always records `info` and above so every step of a run
//! can be reconstructed afterwards.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Console level for the verbosity flags
pub fn level_for(verbose: bool, quiet: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Install the global subscriber
///
/// The log file is opened in append mode and its parent directory created.
/// Only the first call in a process takes effect.
pub fn init_logging(level: Level, log_file: Option<&Path>) -> io::Result<()> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let console = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(console_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let file_level = if level == Level::DEBUG || level == Level::TRACE {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            };
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(file_level),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .ok();
    Ok(())
}
