//! Common utilities and types shared across CLI commands

use crate::error::{CommandError, Result};
use settle_config::{Config, Configuration};
use settle_core::path::AbsPath;
use std::path::Path;
use std::sync::Arc;

/// Runtime context for CLI commands
#[derive(Clone)]
pub struct RuntimeContext {
    /// Loaded configuration file (shared via Arc, not cloned per command)
    pub config: Arc<Config>,
}

impl RuntimeContext {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build the runtime configuration, with command-line directories winning
    /// over the file
    ///
    /// # Errors
    ///
    /// Returns an error if the module or target directory is missing from both,
    /// or the configuration is invalid.
    pub fn configuration(&self, module: Option<&Path>, target: Option<&Path>) -> Result<Configuration> {
        let mut config = Config::clone(&self.config);
        if let Some(module) = module {
            config.general.module = Some(module.to_path_buf());
        }
        if let Some(target) = target {
            config.general.target = Some(target.to_path_buf());
        }
        Configuration::from_config(&config).map_err(CommandError::config)
    }

    /// Module directory from the command line or the file
    ///
    /// # Errors
    ///
    /// Returns an error if neither names one.
    pub fn module_root(&self, module: Option<&Path>) -> Result<AbsPath> {
        let module = module
            .or(self.config.general.module.as_deref())
            .ok_or(CommandError::MissingDirectory("module"))?;
        Ok(AbsPath::resolve(module)?)
    }

    pub fn template_suffix(&self) -> &str {
        &self.config.general.template_suffix
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_command_line_directories_win() {
        let config = Config::from_toml_str(
            "[general]\nmodule = \"/etc/settle/module\"\ntarget = \"/srv\"\nbackup = false\n",
            Path::new("/"),
        )
        .unwrap();
        let context = RuntimeContext::new(config);

        let configuration = context
            .configuration(None, Some(Path::new("/opt/app")))
            .unwrap();
        assert_eq!(configuration.module_root().as_path(), Path::new("/etc/settle/module"));
        assert_eq!(configuration.sync_root().as_path(), Path::new("/opt/app"));
        assert!(configuration.backup_dir().is_none());
    }

    #[test]
    fn test_missing_module_is_reported() {
        let context = RuntimeContext::new(Config::default());
        let err = context.module_root(None).unwrap_err();
        assert!(err.to_string().contains("module"));

        let err = context.configuration(None, None).unwrap_err();
        assert!(matches!(err, CommandError::ConfigError(_)));
    }
}
