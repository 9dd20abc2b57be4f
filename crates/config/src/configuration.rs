//! Runtime configuration
//!
//! [`Configuration`] is what the reconciler borrows for one run: resolved
//! directories, property bindings, the dependency map and the environment
//! classifier. It is built either from a loaded [`Config`] or directly in code.

use crate::Result;
use crate::config::Config;
use crate::dependencies::DependencyMap;
use crate::env::{AddressClassifier, EnvironmentClassifier, StaticClassifier};
use indexmap::IndexMap;
use settle_core::PropertyValue;
use settle_core::path::AbsPath;
use std::sync::Arc;

/// Everything one reconciliation run needs from the outside
#[derive(Clone)]
pub struct Configuration {
    module_root: AbsPath,
    sync_root: AbsPath,
    template_suffix: String,
    backup_dir: Option<AbsPath>,
    state_dir: Option<AbsPath>,
    properties: IndexMap<String, PropertyValue>,
    dependencies: DependencyMap,
    classifier: Arc<dyn EnvironmentClassifier>,
}

impl Configuration {
    /// Minimal configuration: no backups, no persisted state, development environment
    pub fn new(module_root: AbsPath, sync_root: AbsPath) -> Self {
        Self {
            module_root,
            sync_root,
            template_suffix: ".tmpl".to_string(),
            backup_dir: None,
            state_dir: None,
            properties: IndexMap::new(),
            dependencies: DependencyMap::new(),
            classifier: Arc::new(StaticClassifier::default()),
        }
    }

    /// Build from a loaded configuration file
    ///
    /// Missing backup and state directories fall back to the XDG defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the module or target directory is not set, or the
    /// `[env]` section does not parse.
    pub fn from_config(config: &Config) -> Result<Self> {
        let general = &config.general;

        let module = general.module.as_deref().ok_or_else(|| {
            settle_core::Error::Config("No module directory configured".to_string())
        })?;
        let target = general.target.as_deref().ok_or_else(|| {
            settle_core::Error::Config("No target directory configured".to_string())
        })?;

        let backup_dir = if general.backup {
            let dir = general
                .backup_dir
                .clone()
                .or_else(crate::dirs::default_backup_dir)
                .ok_or_else(|| {
                    settle_core::Error::Config(
                        "Cannot determine a backup directory; set general.backupDir".to_string(),
                    )
                })?;
            Some(AbsPath::resolve(&dir)?)
        } else {
            None
        };

        let state_dir = general
            .state_dir
            .clone()
            .or_else(crate::dirs::state_dir)
            .map(|d| AbsPath::resolve(&d))
            .transpose()?;

        Ok(Self {
            module_root: AbsPath::resolve(module)?,
            sync_root: AbsPath::resolve(target)?,
            template_suffix: general.template_suffix.clone(),
            backup_dir,
            state_dir,
            properties: config.properties.clone(),
            dependencies: config.dependencies.clone(),
            classifier: Arc::new(AddressClassifier::from_config(&config.env)?),
        })
    }

    #[must_use]
    pub fn with_template_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.template_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn with_backup_dir(mut self, dir: Option<AbsPath>) -> Self {
        self.backup_dir = dir;
        self
    }

    #[must_use]
    pub fn with_state_dir(mut self, dir: Option<AbsPath>) -> Self {
        self.state_dir = dir;
        self
    }

    /// Add or override one property binding
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: DependencyMap) -> Self {
        self.dependencies = dependencies;
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn EnvironmentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn module_root(&self) -> &AbsPath {
        &self.module_root
    }

    pub fn sync_root(&self) -> &AbsPath {
        &self.sync_root
    }

    pub fn template_suffix(&self) -> &str {
        &self.template_suffix
    }

    /// `None` when backups are disabled
    pub fn backup_dir(&self) -> Option<&AbsPath> {
        self.backup_dir.as_ref()
    }

    pub fn state_dir(&self) -> Option<&AbsPath> {
        self.state_dir.as_ref()
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyValue> {
        &self.properties
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn classifier(&self) -> Arc<dyn EnvironmentClassifier> {
        Arc::clone(&self.classifier)
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("module_root", &self.module_root)
            .field("sync_root", &self.sync_root)
            .field("template_suffix", &self.template_suffix)
            .field("backup_dir", &self.backup_dir)
            .field("state_dir", &self.state_dir)
            .field("properties", &self.properties)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::env::Environment;
    use std::path::Path;

    #[test]
    fn test_from_config_requires_module_and_target() {
        let config = Config::from_toml_str("", Path::new("/base")).unwrap();
        let err = Configuration::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("module"));
    }

    #[test]
    fn test_from_config_resolves_directories() {
        let toml = r#"
[general]
module = "mod"
target = "/srv/app"
backupDir = "/var/backups/settle"
stateDir = "/var/lib/settle"

[properties]
var = "xyz"
"#;
        let config = Config::from_toml_str(toml, Path::new("/base")).unwrap();
        let cfg = Configuration::from_config(&config).unwrap();

        assert_eq!(cfg.module_root().as_path(), Path::new("/base/mod"));
        assert_eq!(cfg.sync_root().as_path(), Path::new("/srv/app"));
        assert_eq!(
            cfg.backup_dir().unwrap().as_path(),
            Path::new("/var/backups/settle")
        );
        assert_eq!(cfg.state_dir().unwrap().as_path(), Path::new("/var/lib/settle"));
        assert_eq!(cfg.properties()["var"], PropertyValue::from("xyz"));
        assert_eq!(cfg.template_suffix(), ".tmpl");
    }

    #[test]
    fn test_backup_disabled() {
        let toml = r#"
[general]
module = "/m"
target = "/t"
backup = false
"#;
        let config = Config::from_toml_str(toml, Path::new("/base")).unwrap();
        let cfg = Configuration::from_config(&config).unwrap();
        assert!(cfg.backup_dir().is_none());
    }

    #[test]
    fn test_with_property_overrides() {
        let cfg = Configuration::new(
            AbsPath::new("/m".into()).unwrap(),
            AbsPath::new("/t".into()).unwrap(),
        )
        .with_property("var", "a")
        .with_property("var", "b");
        assert_eq!(cfg.properties().len(), 1);
        assert_eq!(cfg.properties()["var"], PropertyValue::from("b"));
    }

    #[test]
    fn test_default_classifier_is_development() {
        let cfg = Configuration::new(
            AbsPath::new("/m".into()).unwrap(),
            AbsPath::new("/t".into()).unwrap(),
        );
        assert_eq!(cfg.classifier().classify().unwrap(), Environment::Development);
    }
}
