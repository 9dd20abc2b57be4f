//! Package and service command lines per host flavour

use super::{CommandOutput, ServiceAction};
use settle_core::{Error, Result};
use std::path::Path;

/// Package tooling family of a distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    /// dpkg / apt-get, SysV boot links via update-rc.d
    Deb,
    /// rpm / yum, boot links via chkconfig
    Rpm,
    Unsupported,
}

impl PackageFamily {
    /// Classify a distribution name as reported by `os_info`
    pub fn from_distribution(name: &str) -> Self {
        const DEB: &[&str] = &[
            "debian", "ubuntu", "mint", "pop!_os", "raspbian", "raspberry", "kali", "elementary",
            "deepin", "zorin",
        ];
        const RPM: &[&str] = &[
            "red hat", "redhat", "centos", "fedora", "amazon", "oracle", "rocky", "alma",
        ];

        let name = name.to_lowercase();
        if DEB.iter().any(|d| name.contains(d)) {
            Self::Deb
        } else if RPM.iter().any(|r| name.contains(r)) {
            Self::Rpm
        } else {
            Self::Unsupported
        }
    }

    /// Dependency file extension for local packages (`deb` / `rpm`)
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Deb => Some("deb"),
            Self::Rpm => Some("rpm"),
            Self::Unsupported => None,
        }
    }

    /// Package spec with an optional pinned version
    pub fn versioned(&self, pack: &str, version: Option<&str>) -> String {
        match (self, version) {
            (Self::Deb, Some(v)) => format!("{pack}={v}"),
            (Self::Rpm, Some(v)) => format!("{pack}-{v}"),
            _ => pack.to_string(),
        }
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::Command {
            command: operation.to_string(),
            message: "no package tooling known for this distribution".to_string(),
        }
    }

    pub fn register_on_boot(&self, service: &str) -> Result<Vec<String>> {
        match self {
            Self::Deb => Ok(vec![format!("update-rc.d {service} defaults")]),
            Self::Rpm => Ok(vec![
                format!("chkconfig --add {service}"),
                format!("chkconfig {service} on"),
                format!("chkconfig --list {service}"),
            ]),
            Self::Unsupported => Err(self.unsupported("register_on_boot")),
        }
    }

    pub fn unregister_from_boot(&self, service: &str) -> Result<Vec<String>> {
        match self {
            Self::Deb => Ok(vec![format!("update-rc.d -f {service} remove")]),
            Self::Rpm => Ok(vec![format!("chkconfig --del {service}")]),
            Self::Unsupported => Err(self.unsupported("unregister_from_boot")),
        }
    }

    pub fn is_installed(&self, pack: &str) -> Result<String> {
        match self {
            Self::Deb => Ok(format!("dpkg-query -l {pack}")),
            Self::Rpm => Ok(format!("rpm -qa | grep {pack}")),
            Self::Unsupported => Err(self.unsupported("is_installed")),
        }
    }

    /// Interpret the output of [`Self::is_installed`]
    pub fn installed_from_output(&self, out: &CommandOutput) -> bool {
        match self {
            Self::Deb => out.success() && out.output.lines().any(|l| l.starts_with("ii")),
            Self::Rpm => !out.output.trim().is_empty(),
            Self::Unsupported => false,
        }
    }

    pub fn install_local(&self, path: &Path) -> Result<String> {
        match self {
            Self::Deb => Ok(format!("dpkg -i '{}'", path.display())),
            Self::Rpm => Ok(format!("rpm -i '{}'", path.display())),
            Self::Unsupported => Err(self.unsupported("install_local")),
        }
    }

    pub fn install_remote(&self, pack: &str) -> Result<String> {
        match self {
            Self::Deb => Ok(format!("apt-get -y install {pack}")),
            Self::Rpm => Ok(format!("yum -y install {pack}")),
            Self::Unsupported => Err(self.unsupported("install_remote")),
        }
    }

    pub fn uninstall_local(&self, pack: &str) -> Result<Vec<String>> {
        match self {
            Self::Deb => Ok(vec![
                format!("dpkg --purge {pack}"),
                "apt-get -y autoremove".to_string(),
            ]),
            Self::Rpm => Ok(vec![format!("rpm -e {pack}")]),
            Self::Unsupported => Err(self.unsupported("uninstall_local")),
        }
    }

    pub fn uninstall_remote(&self, pack: &str) -> Result<String> {
        match self {
            Self::Deb => Ok(format!("apt-get -y --auto-remove purge {pack}")),
            Self::Rpm => Ok(format!("yum -y erase {pack}")),
            Self::Unsupported => Err(self.unsupported("uninstall_remote")),
        }
    }

    pub fn add_repository(&self, repository: &str) -> Result<Vec<String>> {
        match self {
            Self::Deb => Ok(vec![
                format!("add-apt-repository -y {repository}"),
                "apt-get update".to_string(),
            ]),
            Self::Rpm => Ok(vec![format!(
                "yum-config-manager --add-repo {repository}"
            )]),
            Self::Unsupported => Err(self.unsupported("add_repository")),
        }
    }
}

/// Service control front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    Systemd,
    SysV,
}

impl ServiceManager {
    /// systemd when `systemctl` is on PATH
    pub fn detect() -> Self {
        if which::which("systemctl").is_ok() {
            Self::Systemd
        } else {
            Self::SysV
        }
    }

    pub fn command(&self, service: &str, action: ServiceAction) -> String {
        match self {
            Self::Systemd => format!("systemctl {} {service}", action.as_str()),
            Self::SysV => format!("service {service} {}", action.as_str()),
        }
    }
}
