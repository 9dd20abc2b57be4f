//! Module tree scanner
//!
//! Walks a module directory into a flat, ordered list of [`ModuleNode`]s. The
//! order is a preorder walk with siblings sorted by file name: every directory
//! comes before everything nested under it, so a module's pre block runs before
//! any work on its subtree.
//!
//! Hook files never become nodes:
//!
//! - `Module.hook` belongs to the directory containing it
//! - `<name>.hook` belongs to the file `<name>` next to it
//!
//! The whole tree is validated before anything is returned, so a broken tree
//! fails the run before the first mutation.

use crate::hooks::HookDefinition;
use crate::node::{ModuleNode, NodeKind};
use settle_core::path::{AbsPath, RelPath};
use settle_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use walkdir::WalkDir;

/// Name of the per-directory hook file
pub const MODULE_HOOK: &str = "Module.hook";

/// Suffix of per-file hook files
pub const HOOK_SUFFIX: &str = ".hook";

pub struct ModuleTreeScanner {
    root: AbsPath,
    template_suffix: String,
}

struct DirEntry {
    name: String,
    is_dir: bool,
}

impl ModuleTreeScanner {
    pub fn new(root: AbsPath, template_suffix: impl Into<String>) -> Self {
        Self {
            root,
            template_suffix: template_suffix.into(),
        }
    }

    pub fn root(&self) -> &AbsPath {
        &self.root
    }

    /// Scan the module tree
    ///
    /// Each call reads the filesystem again.
    ///
    /// # Errors
    ///
    /// Returns `Error::Scan` for dangling or ambiguous hooks and for two sources
    /// that map to the same target, `Error::HookParse` for malformed hook files,
    /// and I/O errors for unreadable directories.
    #[tracing::instrument(skip(self), fields(root = %self.root))]
    pub fn scan(&self) -> Result<Vec<ModuleNode>> {
        if !self.root.as_path().is_dir() {
            return Err(Error::scan(
                self.root.as_path(),
                "module root is not a directory",
            ));
        }

        let mut nodes = Vec::new();
        self.scan_dir(&RelPath::root(), &RelPath::root(), &mut nodes)?;

        tracing::debug!(count = nodes.len(), "Scanned module tree");
        Ok(nodes)
    }

    fn scan_dir(&self, rel: &RelPath, target: &RelPath, nodes: &mut Vec<ModuleNode>) -> Result<()> {
        let dir = self.root.join(rel);
        let entries = list_dir(&dir)?;

        let names: HashMap<&str, bool> =
            entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();

        let module_hook = if names.contains_key(MODULE_HOOK) {
            if names.contains_key("Module") {
                return Err(Error::scan(
                    dir.as_path().join(MODULE_HOOK),
                    "ambiguous hook: claimed by both this directory and the sibling 'Module'",
                ));
            }
            if names[MODULE_HOOK] {
                return Err(Error::scan(
                    dir.as_path().join(MODULE_HOOK),
                    "Module.hook must be a file",
                ));
            }
            Some(HookDefinition::load(
                &dir.as_path().join(MODULE_HOOK),
                NodeKind::Module,
            )?)
        } else {
            None
        };

        nodes.push(ModuleNode::new(
            rel.clone(),
            NodeKind::Module,
            dir.clone(),
            target.clone(),
            false,
            module_hook,
        ));

        let file_hooks = self.pair_file_hooks(&dir, &entries, &names)?;
        let mut targets: BTreeMap<String, &str> = BTreeMap::new();

        for entry in &entries {
            let name = entry.name.as_str();
            if name.ends_with(HOOK_SUFFIX) {
                continue;
            }

            let target_name = if entry.is_dir {
                name
            } else {
                self.strip_template_suffix(name).unwrap_or(name)
            };
            if let Some(other) = targets.insert(target_name.to_string(), name) {
                return Err(Error::scan(
                    dir.as_path().join(name),
                    format!("'{other}' and '{name}' both deploy to '{target_name}'"),
                ));
            }

            let child_rel = rel.join_name(name)?;
            let child_target = target.join_name(target_name)?;

            if entry.is_dir {
                self.scan_dir(&child_rel, &child_target, nodes)?;
            } else {
                let hook = match file_hooks.get(name) {
                    Some(path) => Some(HookDefinition::load(path, NodeKind::File)?),
                    None => None,
                };
                nodes.push(ModuleNode::new(
                    child_rel,
                    NodeKind::File,
                    dir.join(&RelPath::from_key(name)?),
                    child_target,
                    target_name != name,
                    hook,
                ));
            }
        }

        Ok(())
    }

    /// Map deployable file names to their hook files
    fn pair_file_hooks(
        &self,
        dir: &AbsPath,
        entries: &[DirEntry],
        names: &HashMap<&str, bool>,
    ) -> Result<HashMap<String, std::path::PathBuf>> {
        let mut hooks = HashMap::new();

        for entry in entries {
            let name = entry.name.as_str();
            if name == MODULE_HOOK {
                continue;
            }
            let Some(owner) = name.strip_suffix(HOOK_SUFFIX) else {
                continue;
            };
            let path = dir.as_path().join(name);

            if entry.is_dir {
                return Err(Error::scan(path, "hook must be a file"));
            }
            match names.get(owner) {
                None => {
                    return Err(Error::scan(
                        path,
                        format!("dangling hook: no file named '{owner}'"),
                    ));
                }
                Some(true) => {
                    return Err(Error::scan(
                        path,
                        format!("'{owner}' is a directory; use {owner}/{MODULE_HOOK}"),
                    ));
                }
                Some(false) if owner.ends_with(HOOK_SUFFIX) => {
                    return Err(Error::scan(path, "a hook cannot have a hook"));
                }
                Some(false) => {
                    hooks.insert(owner.to_string(), path);
                }
            }
        }

        Ok(hooks)
    }

    fn strip_template_suffix<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.template_suffix.is_empty() {
            return None;
        }
        name.strip_suffix(self.template_suffix.as_str())
            .filter(|stem| !stem.is_empty())
    }
}

fn list_dir(dir: &AbsPath) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir.as_path())
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir.as_path()).to_path_buf();
            match e.into_io_error() {
                Some(io) => Error::directory_read(path, io),
                None => Error::scan(path, "filesystem loop"),
            }
        })?;
        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| Error::scan(entry.path(), "file name is not valid UTF-8"))?
            .to_string();
        entries.push(DirEntry {
            name,
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(entries)
}
