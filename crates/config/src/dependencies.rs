//! Dependency resolution map
//!
//! Maps a dependency name to a local artifact. A name may carry a packaging
//! qualifier after `@` (`nginx@deb`, `app@war`), which lets one module ship the
//! same dependency for several package formats.

use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Archive qualifiers tried after the platform package qualifier
pub const ARCHIVE_EXTENSIONS: [&str; 4] = ["zip", "ear", "war", "jar"];

/// Dependency name to local path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMap(IndexMap<String, PathBuf>);

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` (optionally `name@qualifier`) at `path`
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.0.insert(name.into(), path.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    pub(crate) fn paths_mut(&mut self) -> impl Iterator<Item = &mut PathBuf> {
        self.0.values_mut()
    }

    /// Resolve a dependency to its local path
    ///
    /// Lookup order: the exact name, `name@<pack_extension>` when a package
    /// extension is given, then `name@zip`, `name@ear`, `name@war`, `name@jar`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DependencyNotFound` when no candidate is registered.
    ///
    /// # Examples
    ///
    /// ```
    /// use settle_config::DependencyMap;
    ///
    /// let mut deps = DependencyMap::new();
    /// deps.insert("nginx@deb", "/deps/nginx.deb");
    /// deps.insert("app@war", "/deps/app.war");
    ///
    /// assert!(deps.resolve("nginx", Some("deb")).is_ok());
    /// assert!(deps.resolve("nginx", Some("rpm")).is_err());
    /// assert!(deps.resolve("app", Some("rpm")).is_ok());
    /// ```
    pub fn resolve(&self, name: &str, pack_extension: Option<&str>) -> Result<&Path> {
        if let Some(path) = self.0.get(name) {
            return Ok(path);
        }

        let candidates = pack_extension.into_iter().chain(ARCHIVE_EXTENSIONS);
        for ext in candidates {
            if let Some(path) = self.0.get(&format!("{name}@{ext}")) {
                tracing::debug!(dependency = name, qualifier = ext, "Resolved dependency");
                return Ok(path);
            }
        }

        Err(settle_core::Error::DependencyNotFound(name.to_string()))
    }
}
