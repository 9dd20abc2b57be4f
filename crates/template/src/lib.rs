//! # Settle Template
//!
//! Template engine integration for settle using minijinja.
//!
//! Template sources (files carrying the template suffix) and hook blocks are both
//! rendered by [`TemplateEngine`]. Hook evaluation registers its capability
//! functions on top of the base environment through [`TemplateEngine::env_mut`].

pub mod engine;
pub mod functions;

pub use engine::TemplateEngine;

use thiserror::Error;

/// Result type for template operations
pub type Result<T> = std::result::Result<T, Error>;

/// Template engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Template rendering error
    #[error("Template error at {location}: {message}")]
    Render { location: String, message: String },
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        let mut location = match (err.name(), err.line()) {
            (Some(name), Some(line)) => format!("{name} line {line}"),
            (Some(name), None) => name.to_string(),
            (None, Some(line)) => format!("line {line}"),
            (None, None) => "unknown location".to_string(),
        };
        if let (Some(_), Some(range)) = (err.line(), err.range()) {
            location.push_str(&format!(", column {}", range.start));
        }

        let mut message = err.to_string();
        if let Some(detail) = err.detail()
            && !message.contains(detail)
        {
            message = format!("{message} ({detail})");
        }

        Error::Render { location, message }
    }
}
