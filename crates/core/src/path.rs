//! Type-safe path types
//!
//! This module provides two distinct path types using the newtype pattern:
//!
//! - [`AbsPath`]: Absolute filesystem paths (module root, sync root, backup dir)
//! - [`RelPath`]: Contained relative paths (no leading slash, no `..`)
//!
//! Every node of a module tree is addressed by a `RelPath`; the same value is joined
//! onto the module root to find the source and onto the sync root to find the target.
//!
//! # Examples
//!
//! ```
//! use settle_core::path::{AbsPath, RelPath};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = AbsPath::new("/srv/app".into())?;
//! let conf = RelPath::new("etc/app.conf".into())?;
//!
//! let target = root.join(&conf);
//! assert_eq!(target.as_path().to_str().unwrap(), "/srv/app/etc/app.conf");
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// An absolute path on the filesystem
///
/// This type guarantees that the path is absolute (starts with `/` on Unix or a drive letter on Windows).
///
/// # Examples
///
/// ```
/// use settle_core::path::AbsPath;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let abs = AbsPath::new("/srv/app".into())?;
/// assert_eq!(abs.as_path(), std::path::Path::new("/srv/app"));
///
/// assert!(AbsPath::new("relative/path".into()).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsPath(PathBuf);

impl AbsPath {
    /// Create a new `AbsPath` from a `PathBuf`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn new(path: PathBuf) -> Result<Self> {
        if path.is_absolute() {
            Ok(AbsPath(path))
        } else {
            Err(Error::PathNotAbsolute { path })
        }
    }

    /// Resolve `path` against the current directory when it is relative
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn resolve(path: &Path) -> Result<Self> {
        if path.is_absolute() {
            return Ok(AbsPath(path.to_path_buf()));
        }
        let cwd = std::env::current_dir()?;
        Ok(AbsPath(cwd.join(path)))
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to a `PathBuf`
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join with a relative path to create a new absolute path
    pub fn join(&self, rel: &RelPath) -> Self {
        if rel.is_root() {
            return self.clone();
        }
        AbsPath(self.0.join(rel.as_path()))
    }

    /// Get the parent directory
    ///
    /// Returns `None` if this is the root directory.
    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| AbsPath(p.to_path_buf()))
    }

    /// Strip a base directory prefix to get a relative path
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not under `base`.
    ///
    /// # Examples
    ///
    /// ```
    /// use settle_core::path::AbsPath;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let root = AbsPath::new("/srv/app".into())?;
    /// let file = AbsPath::new("/srv/app/etc/app.conf".into())?;
    /// let rel = file.strip_prefix(&root)?;
    /// assert_eq!(rel.to_key(), "etc/app.conf");
    /// # Ok(())
    /// # }
    /// ```
    pub fn strip_prefix(&self, base: &AbsPath) -> Result<RelPath> {
        self.0
            .strip_prefix(&base.0)
            .map_err(|_| Error::InvalidPathPrefix {
                path: Arc::new(self.as_path().to_path_buf()),
                base: Arc::new(base.as_path().to_path_buf()),
            })
            .and_then(|p| RelPath::new(p.to_path_buf()))
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }
}

/// A relative path contained in its base directory
///
/// The path has no root, no prefix and no `..` components, so joining it onto any
/// base can never leave that base. The empty path addresses the base itself and is
/// used for the root module of a tree.
///
/// # Examples
///
/// ```
/// use settle_core::path::RelPath;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let rel = RelPath::new("etc/app.conf".into())?;
/// assert_eq!(rel.depth(), 2);
///
/// assert!(RelPath::new("../outside".into()).is_err());
/// assert!(RelPath::root().is_root());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelPath(PathBuf);

impl RelPath {
    /// Create a new `RelPath` from a `PathBuf`
    ///
    /// `.` components are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is absolute or contains `..`.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut clean = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::PathNotRelative { path });
                }
            }
        }
        Ok(RelPath(clean))
    }

    /// Parse a `/`-separated key as stored in the managed manifest
    ///
    /// # Errors
    ///
    /// Returns an error if the key would escape its base.
    pub fn from_key(key: &str) -> Result<Self> {
        Self::new(key.split('/').filter(|s| !s.is_empty()).collect())
    }

    /// The empty path (the base directory itself)
    pub fn root() -> Self {
        RelPath(PathBuf::new())
    }

    /// Whether this is the empty path
    pub fn is_root(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to a `PathBuf`
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Append a single name
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is empty or contains a separator or `..`.
    pub fn join_name(&self, name: &str) -> Result<Self> {
        let joined = self.0.join(name);
        let rel = Self::new(joined.clone())?;
        if name.is_empty() || rel.depth() != self.depth() + 1 {
            return Err(Error::PathNotRelative { path: joined });
        }
        Ok(rel)
    }

    /// Get the parent path
    ///
    /// Returns `None` for the empty path.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        self.0.parent().map(|p| RelPath(p.to_path_buf()))
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }

    /// Number of components
    pub fn depth(&self) -> usize {
        self.0.components().count()
    }

    /// Whether `self` equals `base` or lies below it
    pub fn starts_with(&self, base: &RelPath) -> bool {
        self.0.starts_with(&base.0)
    }

    /// Stable `/`-separated form used as a map and database key
    pub fn to_key(&self) -> String {
        self.0
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl std::fmt::Display for AbsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.to_key())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_rel_path_rejects_escape() {
        assert!(RelPath::new("a/../../b".into()).is_err());
        assert!(RelPath::new("/etc/passwd".into()).is_err());
        assert!(RelPath::from_key("../x").is_err());
    }

    #[test]
    fn test_rel_path_normalizes_cur_dir() {
        let rel = RelPath::new("./a/./b".into()).unwrap();
        assert_eq!(rel.to_key(), "a/b");
        assert_eq!(rel.depth(), 2);
    }

    #[test]
    fn test_join_name() {
        let base = RelPath::new("etc".into()).unwrap();
        assert_eq!(base.join_name("app.conf").unwrap().to_key(), "etc/app.conf");
        assert!(base.join_name("..").is_err());
        assert!(base.join_name("a/b").is_err());
        assert!(base.join_name("").is_err());
    }

    #[test]
    fn test_root_join_is_identity() {
        let root = AbsPath::new("/srv".into()).unwrap();
        assert_eq!(root.join(&RelPath::root()), root);
        assert_eq!(RelPath::root().to_string(), ".");
        assert!(RelPath::root().parent().is_none());
    }

    #[test]
    fn test_starts_with() {
        let dir = RelPath::from_key("a/b").unwrap();
        let file = RelPath::from_key("a/b/c.txt").unwrap();
        let sibling = RelPath::from_key("a/bc").unwrap();
        assert!(file.starts_with(&dir));
        assert!(!sibling.starts_with(&dir));
        assert!(file.starts_with(&RelPath::root()));
    }

    #[test]
    fn test_strip_prefix_outside_base() {
        let root = AbsPath::new("/srv/app".into()).unwrap();
        let other = AbsPath::new("/srv/other".into()).unwrap();
        assert!(matches!(
            other.strip_prefix(&root),
            Err(Error::InvalidPathPrefix { .. })
        ));
    }
}
