//! Recording [`Command`] for dry runs and tests
//!
//! Filesystem operations still go through the native defaults; only process
//! execution is intercepted. Every command line is recorded and answered from a
//! list of scripted responses (first substring match wins, default: success
//! with empty output).

use super::{Command, CommandOutput, PackageFamily, RunOptions, ServiceManager};
use settle_core::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

/// One intercepted `run` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub command: String,
    pub input: Option<String>,
}

#[derive(Debug)]
pub struct RecordingCommand {
    family: PackageFamily,
    address: IpAddr,
    responses: Vec<(String, CommandOutput)>,
    runs: Mutex<Vec<RecordedRun>>,
}

impl RecordingCommand {
    pub fn new() -> Self {
        Self {
            family: PackageFamily::Deb,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            responses: Vec::new(),
            runs: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_package_family(mut self, family: PackageFamily) -> Self {
        self.family = family;
        self
    }

    /// Report `address` as the host address
    #[must_use]
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Answer commands containing `pattern` with `status` and `output`
    #[must_use]
    pub fn respond(mut self, pattern: impl Into<String>, status: i32, output: impl Into<String>) -> Self {
        self.responses.push((
            pattern.into(),
            CommandOutput {
                status,
                output: output.into(),
            },
        ));
        self
    }

    /// Command lines run so far
    pub fn commands(&self) -> Vec<String> {
        self.runs()
            .into_iter()
            .map(|run| run.command)
            .collect()
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for RecordingCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for RecordingCommand {
    fn run(&self, cmd: &str, options: &RunOptions) -> Result<CommandOutput> {
        self.runs
            .lock()
            .map_err(|_| Error::Message("recording lock poisoned".to_string()))?
            .push(RecordedRun {
                command: cmd.to_string(),
                input: options.input.clone(),
            });

        let output = self
            .responses
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or(CommandOutput {
                status: 0,
                output: String::new(),
            });

        if !options.accepts(output.status) {
            return Err(Error::Command {
                command: cmd.to_string(),
                message: format!("exit code {}: {}", output.status, output.output),
            });
        }
        Ok(output)
    }

    fn distribution(&self) -> String {
        match self.family {
            PackageFamily::Deb => "Debian".to_string(),
            PackageFamily::Rpm => "CentOS".to_string(),
            PackageFamily::Unsupported => "Unknown".to_string(),
        }
    }

    fn package_family(&self) -> PackageFamily {
        self.family
    }

    fn service_manager(&self) -> ServiceManager {
        ServiceManager::Systemd
    }

    fn host_address(&self) -> Result<IpAddr> {
        Ok(self.address)
    }
}
