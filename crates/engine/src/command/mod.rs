//! OS capability used by hooks
//!
//! [`Command`] is everything a hook may do to the host besides reading and
//! writing properties: filesystem changes, processes, services and packages.
//!
//! Only process execution, host identity and the package/service flavour are
//! required. Filesystem operations default to native implementations; service,
//! boot-registration and package operations default to command lines built by
//! [`PackageFamily`] and [`ServiceManager`] and executed through [`Command::run`].
//! User and group management goes through the shadow-utils tools (`groupadd`,
//! `useradd`, `userdel`, `chpasswd`) and is skipped on Windows. A test double
//! therefore only has to record `run` calls.

mod package;
mod recording;
mod system;

pub use package::{PackageFamily, ServiceManager};
pub use recording::{RecordedRun, RecordingCommand};
pub use system::SystemCommand;

use settle_config::{AddressSource, HostAddress};
use settle_core::{Error, Result};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use walkdir::WalkDir;

/// Captured result of a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status (`-1` when terminated by a signal)
    pub status: i32,
    /// stdout and stderr, merged
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Options for [`Command::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Log the captured output at info level
    pub print_output: bool,
    /// Exit codes treated as success; empty accepts any code
    pub success_codes: Vec<i32>,
    /// Fed to the process on stdin
    pub input: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            print_output: true,
            success_codes: vec![0],
            input: None,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.print_output = false;
        self
    }

    #[must_use]
    pub fn success_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_codes = codes;
        self
    }

    /// Never fail on the exit code
    #[must_use]
    pub fn accept_any(mut self) -> Self {
        self.success_codes.clear();
        self
    }

    #[must_use]
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn accepts(&self, status: i32) -> bool {
        self.success_codes.is_empty() || self.success_codes.contains(&status)
    }
}

/// Service control verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Status,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Status => "status",
        }
    }
}

/// Host capability consumed by hooks
pub trait Command: Send + Sync {
    /// Run a shell command line
    ///
    /// # Errors
    ///
    /// Returns `Error::Command` if the process cannot start or its exit code is
    /// not accepted by `options`.
    fn run(&self, cmd: &str, options: &RunOptions) -> Result<CommandOutput>;

    /// Human-readable distribution name (`Ubuntu 24.04`, `Fedora 40`, ...)
    fn distribution(&self) -> String;

    /// Package tooling of this host
    fn package_family(&self) -> PackageFamily;

    /// Service tooling of this host
    fn service_manager(&self) -> ServiceManager;

    /// Copy `from` (file or directory) into directory `to_dir`
    fn copy(&self, from: &Path, to_dir: &Path) -> Result<()> {
        let name = from.file_name().ok_or_else(|| {
            Error::Message(format!("Cannot copy {}: no file name", from.display()))
        })?;
        copy_recursive(from, &to_dir.join(name))
    }

    /// Move or rename `from` to `to`, creating the parent of `to`
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        fs::rename(from, to).map_err(|e| Error::file_write(to, e))
    }

    /// Remove a file, symlink or directory tree; missing paths are ignored
    fn remove(&self, path: &Path) -> Result<()> {
        remove_path(path)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| Error::directory_create(path, e))
    }

    /// Sorted entry names of a directory
    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = fs::read_dir(path)
            .map_err(|e| Error::directory_read(path, e))?
            .map(|entry| {
                entry
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .map_err(|e| Error::directory_read(path, e))
            })
            .collect::<Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn chmod(&self, path: &Path, mode: u32, recursive: bool) -> Result<()> {
        let walker = WalkDir::new(path).follow_links(false);
        let walker = if recursive { walker } else { walker.max_depth(0) };
        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::metadata(path, std::io::Error::other(e.to_string()))
            })?;
            if entry.path_is_symlink() {
                continue;
            }
            set_mode(entry.path(), mode)?;
        }
        Ok(())
    }

    /// Change ownership; `owner` may be `user` or `user:group`
    fn chown(&self, path: &Path, owner: &str, recursive: bool) -> Result<()> {
        let flag = if recursive { "-R " } else { "" };
        self.run(
            &format!("chown {flag}{owner} '{}'", path.display()),
            &RunOptions::default().quiet(),
        )
        .map(|_| ())
    }

    /// Create symlink `link` pointing at `target`
    fn symlink(&self, link: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link).map_err(|e| Error::file_write(link, e))
        }
        #[cfg(windows)]
        {
            if target.is_dir() {
                std::os::windows::fs::symlink_dir(target, link)
                    .map_err(|e| Error::file_write(link, e))
            } else {
                std::os::windows::fs::symlink_file(target, link)
                    .map_err(|e| Error::file_write(link, e))
            }
        }
    }

    /// Name of the user running settle
    fn whoami(&self) -> Result<String> {
        self.run("whoami", &RunOptions::default().quiet())
            .map(|out| out.output.trim().to_string())
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<CommandOutput> {
        let cmd = self.service_manager().command(name, action);
        let options = match action {
            // status never fails, unknown services report their error text
            ServiceAction::Status => RunOptions::default().quiet().accept_any(),
            _ => RunOptions::default(),
        };
        self.run(&cmd, &options)
    }

    fn register_on_boot(&self, name: &str) -> Result<()> {
        for cmd in self.package_family().register_on_boot(name)? {
            self.run(&cmd, &RunOptions::default())?;
        }
        Ok(())
    }

    fn unregister_from_boot(&self, name: &str) -> Result<()> {
        for cmd in self.package_family().unregister_from_boot(name)? {
            self.run(&cmd, &RunOptions::default())?;
        }
        Ok(())
    }

    fn is_installed(&self, pack: &str) -> Result<bool> {
        let family = self.package_family();
        let cmd = family.is_installed(pack)?;
        let out = self.run(&cmd, &RunOptions::default().quiet().accept_any())?;
        Ok(family.installed_from_output(&out))
    }

    fn install_local(&self, path: &Path) -> Result<()> {
        let cmd = self.package_family().install_local(path)?;
        self.run(&cmd, &RunOptions::default()).map(|_| ())
    }

    fn install_remote(&self, pack: &str) -> Result<()> {
        let cmd = self.package_family().install_remote(pack)?;
        self.run(&cmd, &RunOptions::default()).map(|_| ())
    }

    fn uninstall_local(&self, pack: &str) -> Result<()> {
        for cmd in self.package_family().uninstall_local(pack)? {
            self.run(&cmd, &RunOptions::default())?;
        }
        Ok(())
    }

    fn uninstall_remote(&self, pack: &str) -> Result<()> {
        let cmd = self.package_family().uninstall_remote(pack)?;
        self.run(&cmd, &RunOptions::default()).map(|_| ())
    }

    fn add_repository(&self, repository: &str) -> Result<()> {
        for cmd in self.package_family().add_repository(repository)? {
            self.run(&cmd, &RunOptions::default())?;
        }
        Ok(())
    }

    /// Extract a zip archive into `dir`
    fn unzip(&self, archive: &Path, dir: &Path) -> Result<()> {
        self.run(
            &format!("unzip -o -q '{}' -d '{}'", archive.display(), dir.display()),
            &RunOptions::default().quiet(),
        )
        .map(|_| ())
    }

    /// Create a group; `options` go before the name as on the command line
    fn groupadd(&self, group: &str, options: Option<&str>) -> Result<()> {
        run_account_tool(self, "groupadd", group, options)
    }

    fn useradd(&self, user: &str, options: Option<&str>) -> Result<()> {
        run_account_tool(self, "useradd", user, options)
    }

    fn userdel(&self, user: &str, options: Option<&str>) -> Result<()> {
        run_account_tool(self, "userdel", user, options)
    }

    /// Set the password of `user`
    ///
    /// The password is fed to `chpasswd` on stdin, so it never shows up in a
    /// command line or in the logs.
    fn passwd(&self, user: &str, password: &str) -> Result<()> {
        if cfg!(windows) {
            tracing::warn!(user, "Setting passwords is not supported on Windows, skipping");
            return Ok(());
        }
        self.run(
            "chpasswd",
            &RunOptions::default()
                .quiet()
                .input(format!("{user}:{password}\n")),
        )
        .map(|_| ())
    }

    /// Run an executable file
    ///
    /// A file that is readable but not executable gets the matching execute bits
    /// first.
    fn execute(&self, file: &Path) -> Result<CommandOutput> {
        make_executable(file)?;
        self.run(&format!("'{}'", file.display()), &RunOptions::default())
    }

    /// Address of this host on its network
    fn host_address(&self) -> Result<IpAddr> {
        HostAddress.address()
    }
}

fn run_account_tool<C: Command + ?Sized>(
    command: &C,
    tool: &str,
    name: &str,
    options: Option<&str>,
) -> Result<()> {
    if cfg!(windows) {
        tracing::warn!(tool, name, "User and group management is not supported on Windows, skipping");
        return Ok(());
    }
    let cmd = match options.map(str::trim).filter(|o| !o.is_empty()) {
        Some(options) => format!("{tool} {options} {name}"),
        None => format!("{tool} {name}"),
    };
    command.run(&cmd, &RunOptions::default()).map(|_| ())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)
        .map_err(|e| Error::metadata(path, e))?
        .permissions()
        .mode()
        & 0o7777;
    let wanted = mode | ((mode & 0o444) >> 2);
    if wanted != mode {
        tracing::debug!(path = %path.display(), mode = %format!("{wanted:o}"), "Making file executable");
        set_mode(path, wanted)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(path: &Path) -> Result<()> {
    fs::metadata(path)
        .map(|_| ())
        .map_err(|e| Error::metadata(path, e))
}

fn copy_recursive(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(from).map_err(|e| Error::metadata(from, e))?;
    if !meta.is_dir() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        fs::copy(from, to).map_err(|e| Error::file_write(to, e))?;
        return Ok(());
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry =
            entry.map_err(|e| Error::directory_read(from, std::io::Error::other(e.to_string())))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Message(e.to_string()))?;
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| Error::directory_create(&dest, e))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| Error::file_write(&dest, e))?;
        }
    }
    Ok(())
}

pub(crate) fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::metadata(path, e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| Error::remove(path, e))
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::metadata(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| Error::metadata(path, e))?
        .permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms).map_err(|e| Error::metadata(path, e))
}
