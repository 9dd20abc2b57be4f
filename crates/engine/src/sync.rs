//! Default node actions: make one target directory or file match its source

use crate::backup::BackupManager;
use crate::command::{remove_path, set_mode};
use crate::node::ModuleNode;
use crate::state::ManagedEntry;
use serde::Serialize;
use settle_core::path::{AbsPath, RelPath};
use settle_core::{Error, Result, TemplateRenderer};
use std::fs;
use std::io::Write;
use std::path::Path;

/// What an action did to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Result of a node action
#[derive(Debug, Clone)]
pub struct Synced {
    pub outcome: SyncOutcome,
    pub entry: ManagedEntry,
}

/// Permission bits of a path (`None` where the platform has none)
pub fn mode_of(path: &Path) -> Result<Option<u32>> {
    let meta = fs::metadata(path).map_err(|e| Error::metadata(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(Some(meta.permissions().mode() & 0o7777))
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        Ok(None)
    }
}

/// Ensure the target directory of a module exists
///
/// A non-directory in the way is backed up and replaced. New directories get the
/// permission bits of the source directory.
pub fn sync_directory(
    node: &ModuleNode,
    target: &AbsPath,
    rel: &RelPath,
    backups: &mut BackupManager,
) -> Result<Synced> {
    let entry = ManagedEntry::directory();
    let path = target.as_path();

    let outcome = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => SyncOutcome::Unchanged,
        Ok(_) => {
            backups.capture(rel)?;
            remove_path(path)?;
            create_directory(node, path)?;
            SyncOutcome::Updated
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            create_directory(node, path)?;
            SyncOutcome::Created
        }
        Err(e) => return Err(Error::metadata(path, e)),
    };

    Ok(Synced { outcome, entry })
}

fn create_directory(node: &ModuleNode, path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::directory_create(path, e))?;
    if let Some(mode) = mode_of(node.source().as_path())? {
        set_mode(path, mode)?;
    }
    Ok(())
}

/// Render or copy a file node onto its target
///
/// Identical content with identical permission bits is left alone, and so is
/// identical content whose permission bits match what `previous` (the entry of
/// the last run) recorded after the node's post hook. Otherwise the existing
/// target is backed up and the new content is written to a temporary sibling
/// that is then renamed over the target.
pub fn sync_file(
    node: &ModuleNode,
    target: &AbsPath,
    rel: &RelPath,
    renderer: &dyn TemplateRenderer,
    context: &serde_json::Value,
    previous: Option<&ManagedEntry>,
    backups: &mut BackupManager,
) -> Result<Synced> {
    let source = node.source().as_path();
    let raw = fs::read(source).map_err(|e| Error::file_read(source, e))?;

    let content = if node.is_template() {
        let text = std::str::from_utf8(&raw)
            .map_err(|e| Error::template(source, format!("not valid UTF-8: {e}")))?;
        renderer
            .render_named_str(&node.rel().to_key(), text, context)?
            .into_bytes()
    } else {
        raw
    };
    let mode = mode_of(source)?;
    let entry = ManagedEntry::file(&content, mode);
    let path = target.as_path();

    let outcome = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {
            let current = fs::read(path).map_err(|e| Error::file_read(path, e))?;
            let current_mode = mode_of(path)?;
            if current == content
                && (current_mode == mode
                    || previous.is_some_and(|p| p.explains(&entry, current_mode)))
            {
                return Ok(Synced {
                    outcome: SyncOutcome::Unchanged,
                    entry,
                });
            }
            backups.capture(rel)?;
            SyncOutcome::Updated
        }
        Ok(_) => {
            backups.capture(rel)?;
            remove_path(path)?;
            SyncOutcome::Updated
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SyncOutcome::Created,
        Err(e) => return Err(Error::metadata(path, e)),
    };

    write_atomic(path, &content, mode)?;
    Ok(Synced { outcome, entry })
}

fn write_atomic(path: &Path, content: &[u8], mode: Option<u32>) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::file_write(path, std::io::Error::other("no parent directory")))?;
    fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;

    let mut temp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::file_write(path, e))?;
    temp.write_all(content)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| Error::file_write(path, e))?;
    if let Some(mode) = mode {
        set_mode(temp.path(), mode)?;
    }
    temp.persist(path)
        .map_err(|e| Error::file_write(path, e.error))?;
    Ok(())
}
