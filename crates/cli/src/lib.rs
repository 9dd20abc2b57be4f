//! Settle CLI library
//!
//! This library contains the CLI logic for settle: argument parsing, loading
//! `settle.toml`, and the `apply`, `scan` and `env` commands.

pub mod cmd;
pub mod command;
pub mod common;
pub mod error;
pub mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settle_config::Config;
use std::path::{Path, PathBuf};

use command::Command;
use common::RuntimeContext;

/// Settle - declarative reconciliation of a directory tree
#[derive(Parser)]
#[command(name = "settle")]
#[command(about = "Reconcile a target directory against a module tree")]
#[command(version)]
#[command(long_about = "Reconcile a target directory against a module tree

Every directory of the module is a module, every file is deployed to the
matching path under the target. Hooks next to modules (Module.hook) and files
(<name>.hook) decide whether a node is applied and run side effects after it.

Paths the previous run deployed but the module no longer contains are backed
up and deleted.")]
pub struct Cli {
    /// Path to the config file (default: ./settle.toml, then the XDG config dir)
    #[arg(long, env = "SETTLE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (shows DEBUG level logs)
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to a file
    #[arg(long, env = "SETTLE_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the settle CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the target directory with the module
    Apply(cmd::apply::ApplyCommand),

    /// List the nodes of a module tree and their hooks
    Scan(cmd::scan::ScanCommand),

    /// Show how this host is classified
    Env(cmd::env::EnvCommand),
}

/// Load the configuration file
///
/// An explicit path must exist; without one the default locations are tried and
/// an empty configuration is used when none is found.
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    match settle_config::dirs::find_config_file() {
        Some(found) => {
            tracing::debug!(config = %found.display(), "Using configuration file");
            Config::load(&found)
                .with_context(|| format!("Failed to load config from {}", found.display()))
        }
        None => {
            tracing::debug!("No configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Main entry point for the CLI logic
///
/// # Errors
///
/// Returns an error if logging cannot be set up, the configuration does not
/// load, or the command fails.
pub fn run(cli: Cli) -> Result<()> {
    settle_config::logging::init(cli.verbose, cli.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let config = load_config(cli.config.as_deref())?;
    let context = RuntimeContext::new(config);

    match cli.command {
        Commands::Apply(apply_cmd) => {
            apply_cmd.execute(&context)?;
        }
        Commands::Scan(scan_cmd) => {
            scan_cmd.execute(&context)?;
        }
        Commands::Env(env_cmd) => {
            env_cmd.execute(&context)?;
        }
    }

    Ok(())
}
