//! Backups of target paths before they are overwritten or removed
//!
//! Every run gets its own directory `<backupDir>/<run stamp>/`. A captured path
//! keeps its position relative to the sync root inside that directory, and each
//! capture is appended to `index.jsonl` next to it. Backups are never pruned.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use settle_core::path::{AbsPath, RelPath};
use settle_core::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the per-run capture log
pub const INDEX_FILE: &str = "index.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    File,
    Directory,
    Symlink,
}

/// One captured target path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Path relative to the sync root
    pub path: String,
    pub kind: BackupKind,
    /// Where the snapshot was written
    pub backup: PathBuf,
    /// RFC 3339 capture time
    pub captured_at: String,
}

pub struct BackupManager {
    sync_root: AbsPath,
    run_dir: Option<PathBuf>,
    records: Vec<BackupRecord>,
}

impl BackupManager {
    /// Backups for one run, stamped with `started`
    pub fn new(sync_root: AbsPath, backup_dir: &AbsPath, started: DateTime<Local>) -> Self {
        let stamp = started.format("%Y%m%d-%H%M%S%.3f").to_string();
        Self {
            sync_root,
            run_dir: Some(backup_dir.as_path().join(stamp)),
            records: Vec::new(),
        }
    }

    /// Manager that captures nothing
    pub fn disabled(sync_root: AbsPath) -> Self {
        Self {
            sync_root,
            run_dir: None,
            records: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.run_dir.is_some()
    }

    /// Directory of this run's backups
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<BackupRecord> {
        self.records
    }

    /// Snapshot the target at `rel` before it is changed
    ///
    /// Does nothing when the path does not exist. The snapshot is flushed to disk
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backup` if the snapshot cannot be written; the caller must
    /// not go on to mutate the path.
    #[tracing::instrument(skip(self), fields(path = %rel))]
    pub fn capture(&mut self, rel: &RelPath) -> Result<Option<&BackupRecord>> {
        let Some(run_dir) = self.run_dir.clone() else {
            return Ok(None);
        };
        let source = self.sync_root.join(rel);
        let meta = match fs::symlink_metadata(source.as_path()) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::metadata(source.as_path(), e)),
        };

        let dest = unique_destination(&run_dir.join(rel.as_path()));
        let fail = |e: &dyn std::fmt::Display| Error::backup(source.as_path(), e.to_string());

        let kind = if meta.file_type().is_symlink() {
            copy_symlink(source.as_path(), &dest).map_err(|e| fail(&e))?;
            BackupKind::Symlink
        } else if meta.is_dir() {
            copy_tree(source.as_path(), &dest).map_err(|e| fail(&e))?;
            BackupKind::Directory
        } else {
            copy_file_durable(source.as_path(), &dest).map_err(|e| fail(&e))?;
            BackupKind::File
        };

        let record = BackupRecord {
            path: rel.to_key(),
            kind,
            backup: dest,
            captured_at: Local::now().to_rfc3339(),
        };
        append_index(&run_dir.join(INDEX_FILE), &record).map_err(|e| fail(&e))?;

        tracing::info!(path = %rel, backup = %record.backup.display(), "Backed up");
        self.records.push(record);
        Ok(self.records.last())
    }
}

/// `dest`, or `dest.~N` if an earlier capture of this run already used it
fn unique_destination(dest: &Path) -> PathBuf {
    if fs::symlink_metadata(dest).is_err() {
        return dest.to_path_buf();
    }
    let mut n = 1;
    loop {
        let mut name = dest.as_os_str().to_owned();
        name.push(format!(".~{n}"));
        let candidate = PathBuf::from(name);
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<&Path> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)?;
    Ok(parent)
}

/// Copy through a synced temp file, then move it into place
fn copy_file_durable(from: &Path, to: &Path) -> std::io::Result<()> {
    let parent = ensure_parent(to)?;
    let content = fs::read(from)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(&content)?;
    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), fs::metadata(from)?.permissions())?;
    temp.persist(to).map_err(|e| e.error)?;
    Ok(())
}

fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    ensure_parent(to)?;
    let target = fs::read_link(from)?;
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, to)
    }
    #[cfg(windows)]
    {
        if from.is_dir() {
            std::os::windows::fs::symlink_dir(target, to)
        } else {
            std::os::windows::fs::symlink_file(target, to)
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let dest = to.join(rel);
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            copy_file_durable(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn append_index(index: &Path, record: &BackupRecord) -> std::io::Result<()> {
    ensure_parent(index)?;
    let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(index)?;
    file.write_all(line.as_bytes())?;
    file.sync_all()
}
