//! Configuration management for settle
//!
//! This crate handles:
//! - Loading `settle.toml`
//! - Building the runtime [`Configuration`] handed to the reconciler
//! - Environment classification from the host address
//! - The dependency map used by hooks
//! - XDG directory management
//! - Logging initialization

pub mod config;
pub mod configuration;
pub mod dependencies;
pub mod dirs;
pub mod env;
pub mod logging;

// Re-export error types from core
pub use settle_core::{Error, PropertyValue, Result};

// Re-export main types
pub use config::{Config, EnvConfig, GeneralConfig};
pub use configuration::Configuration;
pub use dependencies::DependencyMap;
pub use env::{
    AddressClassifier, AddressSource, Environment, EnvironmentClassifier, FixedAddress,
    HostAddress, MemoizedClassifier, StaticClassifier,
};
