//! Error types for CLI commands

use thiserror::Error;

/// Errors that can occur during command execution
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A directory was given neither on the command line nor in the config file
    #[error("No {0} directory given; pass it on the command line or set it in settle.toml")]
    MissingDirectory(&'static str),

    /// A `-D` property that is not `key=value`
    #[error("Invalid property '{0}': expected KEY=VALUE")]
    InvalidProperty(String),

    /// Failure inside the engine
    #[error(transparent)]
    Engine(#[from] settle_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, CommandError>;

impl CommandError {
    /// Create a `ConfigError` from any error type
    pub fn config<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::ConfigError(Box::new(err))
    }
}
