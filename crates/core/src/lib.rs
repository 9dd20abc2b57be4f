//! Core types and utilities for settle
//!
//! This is the foundation crate (Layer 0) that all other settle crates depend on.
//! It provides:
//! - Path types (AbsPath, RelPath)
//! - The shared error taxonomy
//! - Typed property values
//! - Platform detection
//! - The template rendering seam (TemplateRenderer)
//!
//! This crate has no dependencies on other settle crates.

pub mod error;
pub mod path;
pub mod platform;
pub mod traits;
pub mod value;

pub use error::{Error, Result};
pub use traits::TemplateRenderer;
pub use value::PropertyValue;
