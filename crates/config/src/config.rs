//! Configuration file
//!
//! This module handles loading `settle.toml`.
//!
//! ```toml
//! [general]
//! module = "./modules/web"
//! target = "/srv/web"
//! templateSuffix = ".tmpl"
//! backup = true
//!
//! [env]
//! production = ["10.0.0.10"]
//! staging = ["10.0.1.10"]
//!
//! [properties]
//! port = 8080
//! name = "web"
//!
//! [dependencies]
//! "nginx@deb" = "./deps/nginx_1.24_amd64.deb"
//! ```

use crate::Result;
use crate::dependencies::DependencyMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use settle_core::PropertyValue;
use std::fs;
use std::path::{Path, PathBuf};

/// General configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Module directory (the desired-state tree)
    #[serde(default)]
    pub module: Option<PathBuf>,

    /// Sync root on the target filesystem
    #[serde(default)]
    pub target: Option<PathBuf>,

    /// Where backups are written (defaults to the XDG data directory)
    #[serde(default, rename = "backupDir")]
    pub backup_dir: Option<PathBuf>,

    /// Where managed-path state is kept (defaults to the XDG state directory)
    #[serde(default, rename = "stateDir")]
    pub state_dir: Option<PathBuf>,

    /// Filename suffix marking a template source, stripped on install
    #[serde(default = "default_template_suffix", rename = "templateSuffix")]
    pub template_suffix: String,

    /// Capture backups before overwriting or removing target paths
    #[serde(default = "default_backup")]
    pub backup: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            module: None,
            target: None,
            backup_dir: None,
            state_dir: None,
            template_suffix: default_template_suffix(),
            backup: default_backup(),
        }
    }
}

/// Environment classification section
///
/// Each list holds the host addresses that belong to that environment.
/// Addresses not listed anywhere are classified as development.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvConfig {
    #[serde(default)]
    pub production: Vec<String>,

    #[serde(default)]
    pub staging: Vec<String>,

    #[serde(default)]
    pub testing: Vec<String>,

    /// Use this address instead of resolving the host's own
    #[serde(default)]
    pub address: Option<String>,
}

/// Settle configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General configuration section
    #[serde(default)]
    pub general: GeneralConfig,

    /// Environment classification
    #[serde(default)]
    pub env: EnvConfig,

    /// Static property bindings
    #[serde(default)]
    pub properties: IndexMap<String, PropertyValue>,

    /// Dependency name to local artifact path
    #[serde(default)]
    pub dependencies: DependencyMap,

    /// Base directory for resolving relative paths (not serialized)
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

fn default_template_suffix() -> String {
    ".tmpl".to_string()
}

fn default_backup() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    ///
    /// Relative paths inside the file resolve against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or TOML parsing fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            settle_core::Error::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base).map_err(|e| match e {
            settle_core::Error::Config(msg) => {
                settle_core::Error::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Load configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if TOML parsing fails
    pub fn from_toml_str(toml_content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_content).map_err(|e| {
            settle_core::Error::Config(format!("Failed to parse config TOML: {e}"))
        })?;

        if config.general.template_suffix.is_empty() {
            return Err(settle_core::Error::Config(
                "templateSuffix must not be empty".to_string(),
            ));
        }

        config.resolve_relative_paths(base_dir);
        Ok(config)
    }

    /// Directory relative paths were resolved against, if loaded from disk
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Resolve relative paths in configuration
    ///
    /// Expands `~/` to the home directory and joins everything else onto `base_dir`.
    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        self.base_dir = Some(base_dir.to_path_buf());

        let general = &mut self.general;
        for slot in [
            &mut general.module,
            &mut general.target,
            &mut general.backup_dir,
            &mut general.state_dir,
        ] {
            if let Some(path) = slot.take() {
                *slot = Some(Self::resolve_path(&path, base_dir));
            }
        }

        for path in self.dependencies.paths_mut() {
            *path = Self::resolve_path(path, base_dir);
        }
    }

    /// Resolve a single path: expand ~/ and resolve relative paths
    fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();

        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = ::dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~"
            && let Some(home) = ::dirs::home_dir()
        {
            return home;
        }

        if path.is_relative() {
            base_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config(toml_content: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settle.toml");
        fs::write(&config_path, toml_content).unwrap();
        (temp_dir, config_path)
    }

    #[test]
    fn test_general_config_defaults() {
        let config = GeneralConfig::default();
        assert_eq!(config.template_suffix, ".tmpl");
        assert!(config.backup);
        assert!(config.module.is_none());
        assert!(config.target.is_none());
    }

    #[test]
    fn test_load_empty_config() {
        let (_temp_dir, config_path) = create_test_config("");
        let config = Config::load(&config_path).unwrap();

        assert_eq!(config.general.template_suffix, ".tmpl");
        assert!(config.properties.is_empty());
        assert!(config.dependencies.is_empty());
    }

    #[test]
    fn test_load_config_resolves_relative_paths() {
        let toml = r#"
[general]
module = "./modules/web"
target = "/srv/web"
backupDir = "backups"
"#;
        let (temp_dir, config_path) = create_test_config(toml);
        let config = Config::load(&config_path).unwrap();

        assert_eq!(
            config.general.module.as_deref(),
            Some(temp_dir.path().join("./modules/web").as_path())
        );
        assert_eq!(config.general.target, Some(PathBuf::from("/srv/web")));
        assert_eq!(
            config.general.backup_dir,
            Some(temp_dir.path().join("backups"))
        );
        assert_eq!(config.base_dir(), Some(temp_dir.path()));
    }

    #[test]
    fn test_load_config_with_typed_properties() {
        let toml = r#"
[properties]
name = "web"
port = 8080
ratio = 0.5
enabled = true
"#;
        let config = Config::from_toml_str(toml, Path::new("/base")).unwrap();

        assert_eq!(config.properties["name"], PropertyValue::from("web"));
        assert_eq!(config.properties["port"], PropertyValue::Integer(8080));
        assert_eq!(config.properties["ratio"], PropertyValue::Float(0.5));
        assert_eq!(config.properties["enabled"], PropertyValue::Bool(true));
    }

    #[test]
    fn test_load_config_with_dependencies() {
        let toml = r#"
[dependencies]
"nginx@deb" = "deps/nginx.deb"
tool = "/opt/tool.zip"
"#;
        let config = Config::from_toml_str(toml, Path::new("/base")).unwrap();

        assert_eq!(
            config.dependencies.resolve("nginx", Some("deb")).unwrap(),
            Path::new("/base/deps/nginx.deb")
        );
        assert_eq!(
            config.dependencies.resolve("tool", None).unwrap(),
            Path::new("/opt/tool.zip")
        );
    }

    #[test]
    fn test_load_config_with_env_section() {
        let toml = r#"
[env]
production = ["10.0.0.1", "10.0.0.2"]
address = "10.0.0.2"
"#;
        let config = Config::from_toml_str(toml, Path::new("/base")).unwrap();
        assert_eq!(config.env.production.len(), 2);
        assert!(config.env.staging.is_empty());
        assert_eq!(config.env.address.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_resolve_tilde_path() {
        let resolved = Config::resolve_path(Path::new("~/backups"), Path::new("/base"));
        if let Some(home) = ::dirs::home_dir() {
            assert_eq!(resolved, home.join("backups"));
        }
    }

    #[test]
    fn test_empty_template_suffix_rejected() {
        let toml = r#"
[general]
templateSuffix = ""
"#;
        assert!(Config::from_toml_str(toml, Path::new("/base")).is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_temp_dir, config_path) = create_test_config("[general\nmodule = ");
        let err = Config::load(&config_path).unwrap_err();
        assert!(err.to_string().contains("settle.toml"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load(temp_dir.path().join("missing.toml")).is_err());
    }
}
