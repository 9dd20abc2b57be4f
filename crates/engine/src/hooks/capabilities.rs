//! Functions available to hook blocks
//!
//! [`Capabilities`] bundles everything a hook may touch: the run's property store,
//! the host [`Command`], the dependency map and the classified environment. Each
//! operation is a plain method; [`Capabilities::register`] exposes them to the
//! template environment hooks are rendered in.
//!
//! Side-effecting functions render as an empty string, so they can be called
//! inline: `{{ chmod("755", target) }}`. Relative paths are taken relative to the
//! sync root.

use crate::command::{Command, RunOptions, ServiceAction};
use crate::properties::{self, PropertyScope, SharedProperties};
use minijinja::value::ValueKind;
use minijinja::{ErrorKind, Value};
use settle_config::{DependencyMap, Environment};
use settle_core::path::AbsPath;
use settle_core::platform::CURRENT_PLATFORM;
use settle_core::{Error, PropertyValue, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Capabilities {
    command: Arc<dyn Command>,
    properties: SharedProperties,
    dependencies: DependencyMap,
    environment: Environment,
    sync_root: AbsPath,
}

fn fail(err: Error) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string())
}

fn done(_: ()) -> String {
    String::new()
}

/// Convert a template value into a property value
fn to_property(value: &Value) -> Result<PropertyValue> {
    match value.kind() {
        ValueKind::Bool => Ok(PropertyValue::Bool(value.is_true())),
        ValueKind::Number => match i64::try_from(value.clone()) {
            Ok(i) => Ok(PropertyValue::Integer(i)),
            Err(_) => f64::try_from(value.clone())
                .map(PropertyValue::Float)
                .map_err(|e| Error::Message(format!("Invalid number {value}: {e}"))),
        },
        ValueKind::String => Ok(PropertyValue::String(
            value.as_str().unwrap_or_default().to_string(),
        )),
        other => Err(Error::Message(format!(
            "Property values must be strings, booleans or numbers, got {other}"
        ))),
    }
}

/// Parse a permission mode given as `"0755"`, `"755"`, `"0o755"` or `755`
fn parse_mode(value: &Value) -> Result<u32> {
    let raw = match value.as_str() {
        Some(s) => s.trim().to_string(),
        None => value.to_string(),
    };
    let digits = raw.strip_prefix("0o").unwrap_or(&raw);
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| Error::Message(format!("Invalid permission mode '{raw}'")))
}

impl Capabilities {
    pub fn new(
        command: Arc<dyn Command>,
        properties: SharedProperties,
        dependencies: DependencyMap,
        environment: Environment,
        sync_root: AbsPath,
    ) -> Self {
        Self {
            command,
            properties,
            dependencies,
            environment,
            sync_root,
        }
    }

    fn path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.sync_root.as_path().join(path)
        }
    }

    // Properties

    pub fn get(&self, key: &str) -> Result<Option<PropertyValue>> {
        Ok(properties::lock(&self.properties)?.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(properties::lock(&self.properties)?.contains(key))
    }

    pub fn set_property(&self, scope: PropertyScope, key: &str, value: PropertyValue) -> Result<()> {
        tracing::debug!(key, %value, ?scope, "Hook set property");
        properties::lock(&self.properties)?.set(scope, key, value);
        Ok(())
    }

    // Host

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn distribution(&self) -> String {
        self.command.distribution()
    }

    pub fn whoami(&self) -> Result<String> {
        self.command.whoami()
    }

    pub fn what_is_my_ip(&self) -> Result<String> {
        self.command.host_address().map(|address| address.to_string())
    }

    // Filesystem

    pub fn exists(&self, path: &str) -> bool {
        fs::symlink_metadata(self.path(path)).is_ok()
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.command.create_dir(&self.path(path))
    }

    /// Create an empty file or bump its modification time
    pub fn touch(&self, path: &str) -> Result<()> {
        let path = self.path(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::file_write(&path, e))?;
        file.set_modified(std::time::SystemTime::now())
            .map_err(|e| Error::metadata(&path, e))
    }

    pub fn write(&self, path: &str, content: &str) -> Result<()> {
        let path = self.path(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| Error::file_write(&path, e))
    }

    pub fn rm(&self, path: &str) -> Result<()> {
        self.command.remove(&self.path(path))
    }

    pub fn mv(&self, from: &str, to: &str) -> Result<()> {
        self.command.rename(&self.path(from), &self.path(to))
    }

    /// Copy `from` into directory `to`
    ///
    /// A `from` that does not exist is looked up as a dependency name. `to` is
    /// created when missing.
    pub fn cp(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.path(from);
        let from_path = if from_path.exists() {
            from_path
        } else {
            self.dependencies
                .resolve(from, self.command.package_family().extension())
                .map_err(|_| {
                    Error::Message(format!(
                        "Not possible to find file or dependency '{from}'"
                    ))
                })?
                .to_path_buf()
        };
        let to_path = self.path(to);
        if !to_path.exists() {
            self.command.create_dir(&to_path)?;
        }
        self.command.copy(&from_path, &to_path)
    }

    pub fn ls(&self, path: &str) -> Result<Vec<String>> {
        self.command.list_dir(&self.path(path))
    }

    pub fn chmod(&self, mode: &Value, path: &str, recursive: bool) -> Result<()> {
        self.command.chmod(&self.path(path), parse_mode(mode)?, recursive)
    }

    pub fn chown(&self, owner: &str, path: &str, recursive: bool) -> Result<()> {
        self.command.chown(&self.path(path), owner, recursive)
    }

    pub fn ln(&self, link: &str, target: &str) -> Result<()> {
        self.command.symlink(&self.path(link), Path::new(target))
    }

    /// Convert CRLF line endings to LF in place
    pub fn fix_text(&self, path: &str) -> Result<()> {
        let path = self.path(path);
        let content = fs::read_to_string(&path).map_err(|e| Error::file_read(&path, e))?;
        if content.contains("\r\n") {
            fs::write(&path, content.replace("\r\n", "\n"))
                .map_err(|e| Error::file_write(&path, e))?;
        }
        Ok(())
    }

    // Processes

    pub fn run(&self, cmd: &str, options: &RunOptions) -> Result<String> {
        self.command.run(cmd, options).map(|out| out.output)
    }

    pub fn execute(&self, file: &str) -> Result<String> {
        self.command.execute(&self.path(file)).map(|out| out.output)
    }

    // Services

    pub fn service(&self, name: &str, action: ServiceAction) -> Result<String> {
        self.command.service(name, action).map(|out| out.output)
    }

    /// Status text of a service; never fails
    pub fn status(&self, name: &str) -> String {
        match self.command.service(name, ServiceAction::Status) {
            Ok(out) => out.output.to_lowercase(),
            Err(e) => e.to_string(),
        }
    }

    // Packages and dependencies

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.dependencies
            .resolve(name, self.command.package_family().extension())
            .map(Path::to_path_buf)
    }

    /// Install a dependency file when one is registered, else from the repository
    pub fn install(&self, pack: &str, version: Option<&str>) -> Result<()> {
        let family = self.command.package_family();
        match self.dependencies.resolve(pack, family.extension()) {
            Ok(path) => {
                tracing::info!(pack, path = %path.display(), "Installing local package");
                self.command.install_local(path)
            }
            Err(Error::DependencyNotFound(_)) => {
                let spec = family.versioned(pack, version);
                tracing::info!(pack = %spec, "Installing package from repository");
                self.command.install_remote(&spec)
            }
            Err(e) => Err(e),
        }
    }

    /// Uninstall an installed package
    ///
    /// A failing local uninstall falls back to the repository uninstall.
    pub fn uninstall(&self, pack: &str) -> Result<()> {
        if !self.command.is_installed(pack)? {
            tracing::debug!(pack, "Package not installed, nothing to uninstall");
            return Ok(());
        }
        if let Err(e) = self.command.uninstall_local(pack) {
            tracing::warn!(pack, error = %e, "Local uninstall failed, trying repository uninstall");
            return self.command.uninstall_remote(pack);
        }
        Ok(())
    }

    pub fn unzip(&self, dependency: &str, dir: &str) -> Result<()> {
        let archive = self.path(dependency);
        let archive = if archive.exists() {
            archive
        } else {
            self.resolve(dependency)?
        };
        let dir = self.path(dir);
        if !dir.exists() {
            self.command.create_dir(&dir)?;
        }
        self.command.unzip(&archive, &dir)
    }

    /// Expose every capability as a template function
    pub fn register(caps: &Arc<Self>, env: &mut minijinja::Environment<'static>) {
        // properties
        let c = Arc::clone(caps);
        env.add_function("get", move |key: &str| {
            c.get(key)
                .map(|v| v.map(Value::from_serialize).unwrap_or(Value::from(())))
                .map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("contains", move |key: &str| c.contains(key).map_err(fail));
        let c = Arc::clone(caps);
        env.add_function("set_temporary", move |key: &str, value: Value| {
            to_property(&value)
                .and_then(|v| c.set_property(PropertyScope::Temporary, key, v))
                .map(done)
                .map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("set_permanent", move |key: &str, value: Value| {
            to_property(&value)
                .and_then(|v| c.set_property(PropertyScope::Permanent, key, v))
                .map(done)
                .map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("set_property", move |scope: &str, key: &str, value: Value| {
            PropertyScope::parse(scope)
                .and_then(|scope| Ok((scope, to_property(&value)?)))
                .and_then(|(scope, v)| c.set_property(scope, key, v))
                .map(done)
                .map_err(fail)
        });

        // host and environment
        env.add_function("osname", || CURRENT_PLATFORM.os);
        env.add_function("is_linux", || CURRENT_PLATFORM.is_linux());
        env.add_function("is_windows", || CURRENT_PLATFORM.is_windows());
        let c = Arc::clone(caps);
        env.add_function("distribution", move || c.distribution());
        let c = Arc::clone(caps);
        env.add_function("whoami", move || c.whoami().map_err(fail));
        let c = Arc::clone(caps);
        env.add_function("what_is_my_ip", move || c.what_is_my_ip().map_err(fail));
        let c = Arc::clone(caps);
        env.add_function("environment", move || c.environment().as_str());
        for (name, wanted) in [
            ("is_development", Environment::Development),
            ("is_testing", Environment::Testing),
            ("is_staging", Environment::Staging),
            ("is_production", Environment::Production),
        ] {
            let c = Arc::clone(caps);
            env.add_function(name, move || c.environment() == wanted);
        }
        env.add_function("log", |message: &str| {
            tracing::info!(target: "settle::hook", "{message}");
            String::new()
        });

        // filesystem
        let c = Arc::clone(caps);
        env.add_function("exists", move |path: &str| c.exists(path));
        let c = Arc::clone(caps);
        env.add_function("mkdir", move |path: &str| c.mkdir(path).map(done).map_err(fail));
        let c = Arc::clone(caps);
        env.add_function("touch", move |path: &str| c.touch(path).map(done).map_err(fail));
        let c = Arc::clone(caps);
        env.add_function("write", move |path: &str, content: &str| {
            c.write(path, content).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("rm", move |path: &str| c.rm(path).map(done).map_err(fail));
        let c = Arc::clone(caps);
        env.add_function("mv", move |from: &str, to: &str| {
            c.mv(from, to).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("cp", move |from: &str, to: &str| {
            c.cp(from, to).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("ls", move |path: &str| c.ls(path).map_err(fail));
        let c = Arc::clone(caps);
        env.add_function(
            "chmod",
            move |mode: Value, path: &str, recursive: Option<bool>| {
                c.chmod(&mode, path, recursive.unwrap_or(false))
                    .map(done)
                    .map_err(fail)
            },
        );
        let c = Arc::clone(caps);
        env.add_function(
            "chown",
            move |owner: &str, path: &str, recursive: Option<bool>| {
                c.chown(owner, path, recursive.unwrap_or(false))
                    .map(done)
                    .map_err(fail)
            },
        );
        let c = Arc::clone(caps);
        env.add_function("ln", move |link: &str, target: &str| {
            c.ln(link, target).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("fix_text", move |path: &str| {
            c.fix_text(path).map(done).map_err(fail)
        });

        // processes
        let c = Arc::clone(caps);
        env.add_function("run", move |cmd: &str, print_output: Option<bool>| {
            let mut options = RunOptions::default();
            options.print_output = print_output.unwrap_or(true);
            c.run(cmd, &options).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("run_ok", move |cmd: &str, codes: Vec<i64>| {
            let codes = codes
                .into_iter()
                .map(i32::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| fail(Error::Message(format!("Invalid exit code: {e}"))))?;
            c.run(cmd, &RunOptions::default().success_codes(codes))
                .map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("run_interactive", move |cmd: &str, input: &str| {
            c.run(cmd, &RunOptions::default().input(input))
                .map_err(fail)
        });

        let c = Arc::clone(caps);
        env.add_function("execute", move |file: &str| c.execute(file).map_err(fail));

        // users and groups
        let c = Arc::clone(caps);
        env.add_function("groupadd", move |group: &str, options: Option<&str>| {
            c.command.groupadd(group, options).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("useradd", move |user: &str, options: Option<&str>| {
            c.command.useradd(user, options).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("userdel", move |user: &str, options: Option<&str>| {
            c.command.userdel(user, options).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("passwd", move |user: &str, password: &str| {
            c.command.passwd(user, password).map(done).map_err(fail)
        });

        // services
        for (name, action) in [
            ("start", ServiceAction::Start),
            ("stop", ServiceAction::Stop),
            ("restart", ServiceAction::Restart),
        ] {
            let c = Arc::clone(caps);
            env.add_function(name, move |service: &str| {
                c.service(service, action).map_err(fail)
            });
        }
        let c = Arc::clone(caps);
        env.add_function("status", move |service: &str| c.status(service));
        let c = Arc::clone(caps);
        env.add_function("register_on_boot", move |service: &str| {
            c.command.register_on_boot(service).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("unregister_from_boot", move |service: &str| {
            c.command
                .unregister_from_boot(service)
                .map(done)
                .map_err(fail)
        });

        // packages and dependencies
        let c = Arc::clone(caps);
        env.add_function("resolve", move |name: &str| {
            c.resolve(name)
                .map(|p| p.to_string_lossy().into_owned())
                .map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("install", move |pack: &str, version: Option<&str>| {
            c.install(pack, version).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("uninstall", move |pack: &str| {
            c.uninstall(pack).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("add_repository", move |repository: &str| {
            c.command.add_repository(repository).map(done).map_err(fail)
        });
        let c = Arc::clone(caps);
        env.add_function("unzip", move |dependency: &str, dir: &str| {
            c.unzip(dependency, dir).map(done).map_err(fail)
        });
    }
}
