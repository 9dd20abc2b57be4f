//! CLI command implementations

pub mod apply;
pub mod env;
pub mod scan;
