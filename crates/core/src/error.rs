//! Base error types for settle
//!
//! This module provides the error taxonomy shared by every settle crate.
//! Variants that carry a path keep it behind an `Arc` so errors stay cheap to clone
//! into reports.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path is not absolute
    #[error("Path must be absolute: {path}")]
    PathNotAbsolute { path: PathBuf },

    /// Path is not relative or contains components that leave its base
    #[error("Path must be relative and contained: {path}")]
    PathNotRelative { path: PathBuf },

    /// Invalid path prefix
    #[error("Path {} is not under base directory {}", path.display(), base.display())]
    InvalidPathPrefix {
        path: Arc<PathBuf>,
        base: Arc<PathBuf>,
    },

    /// Module tree is inconsistent (dangling hook, name collision, ...)
    #[error("Scan error at {}: {message}", path.display())]
    Scan { path: Arc<PathBuf>, message: String },

    /// Hook file could not be parsed into pre/post blocks
    #[error("Hook parse error in {}: {message}", path.display())]
    HookParse { path: Arc<PathBuf>, message: String },

    /// Pre block produced a value that is not a permitted hook result
    #[error("Hook validation error in {}: {message}", path.display())]
    HookValidation { path: Arc<PathBuf>, message: String },

    /// Hook body failed while evaluating
    #[error("Hook execution error: {0}")]
    HookExecution(String),

    /// Template rendering failed
    #[error("Template error in {}: {message}", path.display())]
    Template { path: Arc<PathBuf>, message: String },

    /// Failed to read a file
    #[error("Failed to read {}: {error}", path.display())]
    FileRead {
        path: Arc<PathBuf>,
        #[source]
        error: std::io::Error,
    },

    /// Failed to write a file
    #[error("Failed to write {}: {error}", path.display())]
    FileWrite {
        path: Arc<PathBuf>,
        #[source]
        error: std::io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory {}: {error}", path.display())]
    DirectoryCreate {
        path: Arc<PathBuf>,
        #[source]
        error: std::io::Error,
    },

    /// Failed to list a directory
    #[error("Failed to read directory {}: {error}", path.display())]
    DirectoryRead {
        path: Arc<PathBuf>,
        #[source]
        error: std::io::Error,
    },

    /// Failed to remove a path
    #[error("Failed to remove {}: {error}", path.display())]
    Remove {
        path: Arc<PathBuf>,
        #[source]
        error: std::io::Error,
    },

    /// Failed to read or change metadata (permissions, ownership)
    #[error("Failed to access metadata of {}: {error}", path.display())]
    Metadata {
        path: Arc<PathBuf>,
        #[source]
        error: std::io::Error,
    },

    /// Backup could not be taken; the destructive operation was not attempted
    #[error("Backup of {} failed: {message}", path.display())]
    Backup { path: Arc<PathBuf>, message: String },

    /// State persistence error
    #[error("State error: {0}")]
    State(String),

    /// Named dependency has no matching artifact
    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    /// External command failed
    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error message
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Wrap an IO error raised while reading `path`
    pub fn file_read(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::FileRead {
            path: Arc::new(path.into()),
            error,
        }
    }

    /// Wrap an IO error raised while writing `path`
    pub fn file_write(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::FileWrite {
            path: Arc::new(path.into()),
            error,
        }
    }

    /// Wrap an IO error raised while creating directory `path`
    pub fn directory_create(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: Arc::new(path.into()),
            error,
        }
    }

    /// Wrap an IO error raised while listing directory `path`
    pub fn directory_read(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::DirectoryRead {
            path: Arc::new(path.into()),
            error,
        }
    }

    /// Wrap an IO error raised while removing `path`
    pub fn remove(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Remove {
            path: Arc::new(path.into()),
            error,
        }
    }

    /// Wrap an IO error raised while touching metadata of `path`
    pub fn metadata(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Metadata {
            path: Arc::new(path.into()),
            error,
        }
    }

    /// Scan error for `path`
    pub fn scan(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Scan {
            path: Arc::new(path.into()),
            message: message.into(),
        }
    }

    /// Hook parse error for `path`
    pub fn hook_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::HookParse {
            path: Arc::new(path.into()),
            message: message.into(),
        }
    }

    /// Hook validation error for `path`
    pub fn hook_validation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::HookValidation {
            path: Arc::new(path.into()),
            message: message.into(),
        }
    }

    /// Template error for `path`
    pub fn template(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Template {
            path: Arc::new(path.into()),
            message: message.into(),
        }
    }

    /// Backup error for `path`
    pub fn backup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Backup {
            path: Arc::new(path.into()),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
