//! Hook system
//!
//! A hook is a small script attached to a module (`Module.hook`) or a file
//! (`<name>.hook`). It has two optional blocks:
//!
//! - `pre`: decides whether the node's default action runs, by producing a
//!   [`HookResult`] keyword as its last output line (nothing means `CONTINUE`)
//! - `post`: side effects after the action, output ignored
//!
//! ## Module Organization
//!
//! - `parser`: splits hook files into blocks
//! - `result`: result keywords and per-kind permitted sets
//! - `capabilities`: functions hooks can call (properties, files, services, packages)
//! - `evaluator`: renders blocks and validates their results

pub mod capabilities;
pub mod evaluator;
pub mod parser;
pub mod result;

pub use capabilities::Capabilities;
pub use evaluator::{HookEvaluator, NodeBindings};
pub use result::{FileHookKind, HookKind, HookResult, ModuleHookKind};

use crate::node::NodeKind;
use settle_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Parsed hook of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDefinition {
    path: PathBuf,
    kind: NodeKind,
    pre: Option<String>,
    post: Option<String>,
}

impl HookDefinition {
    /// Build from raw blocks
    pub fn new(path: impl Into<PathBuf>, kind: NodeKind, pre: Option<String>, post: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            pre,
            post,
        }
    }

    /// Read and parse a hook file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path, kind: NodeKind) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let blocks = parser::parse(path, &content)?;
        Ok(Self::new(path, kind, blocks.pre, blocks.post))
    }

    /// Hook file on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn pre(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn post(&self) -> Option<&str> {
        self.post.as_deref()
    }
}
