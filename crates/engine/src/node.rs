//! Nodes of a scanned module tree

use crate::hooks::{FileHookKind, HookDefinition, HookKind, ModuleHookKind};
use crate::properties::PropertyStore;
use serde::{Deserialize, Serialize};
use settle_core::Result;
use settle_core::path::{AbsPath, RelPath};
use std::fmt;

/// Whether a node is a directory (module) or a deployable file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Module,
    File,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::File => "file",
        }
    }

    /// Hook kind governing the pre results of this node kind
    pub fn hook_kind(&self) -> &'static dyn HookKind {
        match self {
            Self::Module => &ModuleHookKind,
            Self::File => &FileHookKind,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the desired-state tree
///
/// Built by the scanner and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    rel: RelPath,
    kind: NodeKind,
    source: AbsPath,
    target: RelPath,
    is_template: bool,
    hook: Option<HookDefinition>,
}

impl ModuleNode {
    pub(crate) fn new(
        rel: RelPath,
        kind: NodeKind,
        source: AbsPath,
        target: RelPath,
        is_template: bool,
        hook: Option<HookDefinition>,
    ) -> Self {
        Self {
            rel,
            kind,
            source,
            target,
            is_template,
            hook,
        }
    }

    /// Path relative to the module root, unique within a run
    pub fn rel(&self) -> &RelPath {
        &self.rel
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_module(&self) -> bool {
        self.kind == NodeKind::Module
    }

    pub fn source(&self) -> &AbsPath {
        &self.source
    }

    /// Target path relative to the sync root, template suffix stripped,
    /// `@name@` tokens not yet expanded
    pub fn target(&self) -> &RelPath {
        &self.target
    }

    pub fn is_template(&self) -> bool {
        self.is_template
    }

    pub fn hook(&self) -> Option<&HookDefinition> {
        self.hook.as_ref()
    }

    /// Target path with `@name@` tokens replaced by current property values
    ///
    /// # Errors
    ///
    /// Returns an error if a substituted value makes the path escape the sync root.
    pub fn resolve_target(&self, properties: &PropertyStore) -> Result<RelPath> {
        if self.target.is_root() {
            return Ok(RelPath::root());
        }
        RelPath::from_key(&properties.expand(&self.target.to_key()))
    }
}

impl fmt::Display for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.rel)
    }
}
