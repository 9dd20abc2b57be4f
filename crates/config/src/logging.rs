//! Logging configuration
//!
//! Progress lines go to stdout through a compact `tracing` layer; an optional
//! file receives everything at debug level.

use crate::Result;
use std::path::Path;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Crates whose events are shown by default
const CRATES: [&str; 5] = [
    "settle",
    "settle_engine",
    "settle_config",
    "settle_template",
    "settle_core",
];

fn default_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the logging system
///
/// `RUST_LOG` overrides the default filter.
///
/// # Arguments
/// * `verbose` - Debug level and timestamps on stdout
/// * `log_file` - Optional path to append logs to
///
/// # Examples
/// ```ignore
/// init(false, None)?;
/// init(true, Some(Path::new("settle.log")))?;
/// ```
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .map_err(|e| settle_core::Error::Config(format!("Invalid log filter: {e}")))?;

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true);

    // No timestamps in normal mode
    let stdout_layer: Box<dyn Layer<Registry> + Send + Sync> = if verbose {
        stdout_layer.boxed()
    } else {
        stdout_layer.without_time().boxed()
    };

    let file_layer = match log_file {
        Some(log_path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .map_err(|e| settle_core::Error::file_write(log_path, e))?;

            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty()
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer.with_filter(env_filter))
        .with(file_layer)
        .try_init()
        .map_err(|e| settle_core::Error::Config(format!("Logging already initialized: {e}")))?;

    Ok(())
}
