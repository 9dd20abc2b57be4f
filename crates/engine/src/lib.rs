//! # Settle Engine
//!
//! Declarative reconciliation of a target directory tree (the sync root)
//! against a module tree.
//!
//! - **Scanning**: the module tree becomes an ordered list of module and file nodes
//! - **Properties**: permanent and scoped temporary bindings, `@var@` path expansion
//! - **Hooks**: `pre`/`post` blocks deciding and extending what a node does
//! - **Sync**: directory creation, file copy and template rendering with backups
//! - **State**: the managed-path manifest that drives the deletion sweep
//! - **Command**: the host capability hooks use for processes, services and packages

pub mod backup;
pub mod command;
pub mod hooks;
pub mod node;
pub mod properties;
pub mod reconciler;
pub mod report;
pub mod scanner;
pub mod state;
pub mod sync;

// Re-export path types from core
pub use settle_core::path::{AbsPath, RelPath};

// Re-export error types from core
pub use settle_core::{Error, Result};

// Re-export commonly used types
pub use backup::{BackupManager, BackupRecord};
pub use command::{Command, RecordingCommand, RunOptions, SystemCommand};
pub use hooks::{HookEvaluator, HookResult};
pub use node::{ModuleNode, NodeKind};
pub use properties::{PropertyScope, PropertyStore};
pub use reconciler::Reconciler;
pub use report::{NodeOutcome, NodeReport, RunReport};
pub use scanner::ModuleTreeScanner;
pub use state::{
    MockPersistentState, PersistentState, RedbPersistentState, STATE_DB_NAME,
};
