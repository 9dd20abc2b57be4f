//! Host-backed [`Command`]

use super::{Command, CommandOutput, PackageFamily, RunOptions, ServiceManager};
use settle_core::{Error, Result};

/// Runs commands on this host through the platform shell
#[derive(Debug, Clone)]
pub struct SystemCommand {
    distribution: String,
    family: PackageFamily,
    services: ServiceManager,
}

impl SystemCommand {
    /// Detect distribution and service tooling of the current host
    pub fn detect() -> Self {
        let info = os_info::get();
        let distribution = match info.version() {
            os_info::Version::Unknown => info.os_type().to_string(),
            version => format!("{} {version}", info.os_type()),
        };
        let family = PackageFamily::from_distribution(&info.os_type().to_string());

        tracing::debug!(%distribution, ?family, "Detected host");

        Self {
            distribution,
            family,
            services: ServiceManager::detect(),
        }
    }

    #[must_use]
    pub fn with_package_family(mut self, family: PackageFamily) -> Self {
        self.family = family;
        self
    }

    fn shell(cmd: &str) -> duct::Expression {
        #[cfg(windows)]
        {
            duct::cmd("cmd", ["/C", cmd])
        }
        #[cfg(not(windows))]
        {
            duct::cmd("sh", ["-c", cmd])
        }
    }
}

impl Default for SystemCommand {
    fn default() -> Self {
        Self::detect()
    }
}

impl Command for SystemCommand {
    #[tracing::instrument(skip(self, options), fields(print_output = options.print_output))]
    fn run(&self, cmd: &str, options: &RunOptions) -> Result<CommandOutput> {
        let mut expression = Self::shell(cmd)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked();
        if let Some(input) = &options.input {
            expression = expression.stdin_bytes(input.clone().into_bytes());
        }

        let output = expression.run().map_err(|e| Error::Command {
            command: cmd.to_string(),
            message: format!("failed to start: {e}"),
        })?;

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
        };

        if options.print_output {
            for line in result.output.lines() {
                tracing::info!("{line}");
            }
        }

        if !options.accepts(result.status) {
            return Err(Error::Command {
                command: cmd.to_string(),
                message: format!(
                    "exit code {} not in {:?}: {}",
                    result.status,
                    options.success_codes,
                    result.output.trim()
                ),
            });
        }

        Ok(result)
    }

    fn distribution(&self) -> String {
        self.distribution.clone()
    }

    fn package_family(&self) -> PackageFamily {
        self.family
    }

    fn service_manager(&self) -> ServiceManager {
        self.services
    }
}
