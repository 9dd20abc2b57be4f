//! XDG directory utilities
//!
//! Default locations for settle's own files, following the XDG Base Directory
//! specification through the `xdg` crate:
//! - `XDG_DATA_HOME/settle/backups` for backups
//! - `XDG_STATE_HOME/settle` for managed-path state
//! - `XDG_CONFIG_HOME/settle/settle.toml` as the fallback configuration file

use std::path::PathBuf;
use xdg::BaseDirectories;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "settle.toml";

/// Get the settle data directory
///
/// Returns `$XDG_DATA_HOME/settle` or `~/.local/share/settle`
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("settle").get_data_home()
}

/// Get the settle state directory
///
/// Returns `$XDG_STATE_HOME/settle` or `~/.local/state/settle`
#[must_use]
pub fn state_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("settle").get_state_home()
}

/// Default backup store
#[must_use]
pub fn default_backup_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("backups"))
}

/// Locate the configuration file
///
/// `./settle.toml` wins over `$XDG_CONFIG_HOME/settle/settle.toml`.
#[must_use]
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    BaseDirectories::with_prefix("settle")
        .get_config_home()
        .map(|d| d.join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_backup_dir_is_child_of_data_dir() {
        if let (Some(data), Some(backup)) = (data_dir(), default_backup_dir()) {
            assert!(backup.starts_with(&data));
            assert!(backup.ends_with("backups"));
        }
    }

    #[test]
    fn test_dirs_contain_prefix() {
        for dir in [data_dir(), state_dir()].into_iter().flatten() {
            assert!(
                dir.to_string_lossy().contains("settle"),
                "path should contain 'settle': {dir:?}"
            );
        }
    }

    #[test]
    fn test_data_and_state_dirs_are_different() {
        if let (Some(d), Some(s)) = (data_dir(), state_dir()) {
            assert_ne!(d, s, "data_dir and state_dir should be different");
        }
    }
}
