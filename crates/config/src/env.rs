//! Environment classification
//!
//! A host is classified as development, testing, staging or production by looking
//! its address up in the address lists of the `[env]` section. The address comes
//! from an [`AddressSource`]; the reconciler queries the classifier through a
//! [`MemoizedClassifier`] so a run classifies at most once.

use crate::Result;
use crate::config::EnvConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::sync::{Arc, Mutex};

/// Deployment environment of the current host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the host address comes from
pub trait AddressSource: Send + Sync {
    fn address(&self) -> Result<IpAddr>;
}

/// Resolve the address of this host from its hostname
///
/// A private IPv4 address is preferred, then any other non-loopback address,
/// then loopback.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostAddress;

impl AddressSource for HostAddress {
    fn address(&self) -> Result<IpAddr> {
        let name = hostname::get()?;
        let name = name.to_string_lossy();

        let candidates: Vec<IpAddr> = match (name.as_ref(), 0).to_socket_addrs() {
            Ok(addrs) => addrs.map(|a| a.ip()).collect(),
            Err(e) => {
                tracing::debug!(host = %name, error = %e, "Hostname did not resolve");
                Vec::new()
            }
        };

        Ok(pick_address(&candidates))
    }
}

fn pick_address(candidates: &[IpAddr]) -> IpAddr {
    let private_v4 = candidates.iter().find(|ip| match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(_) => false,
    });
    let non_loopback = candidates.iter().find(|ip| !ip.is_loopback());

    private_v4
        .or(non_loopback)
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// A fixed address, from configuration or tests
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub IpAddr);

impl AddressSource for FixedAddress {
    fn address(&self) -> Result<IpAddr> {
        Ok(self.0)
    }
}

/// Something that can tell which environment this host belongs to
pub trait EnvironmentClassifier: Send + Sync {
    fn classify(&self) -> Result<Environment>;
}

/// Classifier backed by address lists
pub struct AddressClassifier {
    source: Box<dyn AddressSource>,
    production: Vec<IpAddr>,
    staging: Vec<IpAddr>,
    testing: Vec<IpAddr>,
}

impl AddressClassifier {
    pub fn new(source: Box<dyn AddressSource>) -> Self {
        Self {
            source,
            production: Vec::new(),
            staging: Vec::new(),
            testing: Vec::new(),
        }
    }

    /// Build from the `[env]` section
    ///
    /// # Errors
    ///
    /// Returns an error if an address in the section does not parse.
    pub fn from_config(env: &EnvConfig) -> Result<Self> {
        let source: Box<dyn AddressSource> = match env.address.as_deref() {
            Some(addr) => Box::new(FixedAddress(parse_address(addr)?)),
            None => Box::new(HostAddress),
        };

        Ok(Self {
            source,
            production: parse_addresses(&env.production)?,
            staging: parse_addresses(&env.staging)?,
            testing: parse_addresses(&env.testing)?,
        })
    }

    #[must_use]
    pub fn with_addresses(mut self, environment: Environment, addresses: Vec<IpAddr>) -> Self {
        match environment {
            Environment::Production => self.production = addresses,
            Environment::Staging => self.staging = addresses,
            Environment::Testing => self.testing = addresses,
            Environment::Development => {}
        }
        self
    }
}

impl EnvironmentClassifier for AddressClassifier {
    fn classify(&self) -> Result<Environment> {
        let address = self.source.address()?;

        let environment = if self.production.contains(&address) {
            Environment::Production
        } else if self.staging.contains(&address) {
            Environment::Staging
        } else if self.testing.contains(&address) {
            Environment::Testing
        } else {
            Environment::Development
        };

        tracing::debug!(%address, %environment, "Classified host");
        Ok(environment)
    }
}

fn parse_address(raw: &str) -> Result<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|e| settle_core::Error::Config(format!("Invalid address '{raw}': {e}")))
}

fn parse_addresses(raw: &[String]) -> Result<Vec<IpAddr>> {
    raw.iter().map(|a| parse_address(a)).collect()
}

/// Classifier that always answers the same environment
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticClassifier(pub Environment);

impl EnvironmentClassifier for StaticClassifier {
    fn classify(&self) -> Result<Environment> {
        Ok(self.0)
    }
}

/// Caches the first successful classification
///
/// One instance lives for one reconciliation run.
pub struct MemoizedClassifier {
    inner: Arc<dyn EnvironmentClassifier>,
    cached: Mutex<Option<Environment>>,
}

impl MemoizedClassifier {
    pub fn new(inner: Arc<dyn EnvironmentClassifier>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

impl EnvironmentClassifier for MemoizedClassifier {
    fn classify(&self) -> Result<Environment> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| settle_core::Error::Message("classifier cache poisoned".to_string()))?;

        if let Some(environment) = *cached {
            return Ok(environment);
        }
        let environment = self.inner.classify()?;
        *cached = Some(environment);
        Ok(environment)
    }
}
