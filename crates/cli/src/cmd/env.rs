//! Env command implementation
//!
//! Show the host address and the environment it classifies as.

use clap::Args;
use owo_colors::OwoColorize;
use settle_config::{
    AddressClassifier, AddressSource, Environment, EnvironmentClassifier, FixedAddress,
    HostAddress,
};
use std::net::IpAddr;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::{CommandError, Result};

/// Show how this host is classified
#[derive(Debug, Args)]
pub struct EnvCommand {}

fn address_source(context: &RuntimeContext) -> Result<Box<dyn AddressSource>> {
    match context.config.env.address.as_deref() {
        Some(raw) => {
            let address: IpAddr = raw
                .trim()
                .parse()
                .map_err(|e| CommandError::config(std::io::Error::other(format!("{raw}: {e}"))))?;
            Ok(Box::new(FixedAddress(address)))
        }
        None => Ok(Box::new(HostAddress)),
    }
}

impl Command for EnvCommand {
    type Output = Environment;

    fn execute(&self, context: &RuntimeContext) -> Result<Environment> {
        let address = address_source(context)?.address()?;
        let environment = AddressClassifier::from_config(&context.config.env)?.classify()?;

        let source = if context.config.env.address.is_some() {
            "configured"
        } else {
            "resolved from hostname"
        };
        println!(
            "{} {}",
            "address:".dimmed(),
            format!("{address} ({source})").bright_white()
        );
        println!(
            "{} {}",
            "environment:".dimmed(),
            environment.as_str().bright_green().bold()
        );
        Ok(environment)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use settle_config::Config;
    use std::path::Path;

    fn context(toml: &str) -> RuntimeContext {
        RuntimeContext::new(Config::from_toml_str(toml, Path::new("/")).unwrap())
    }

    #[test]
    fn test_configured_address_is_classified() {
        let ctx = context("[env]\naddress = \"10.0.0.5\"\nstaging = [\"10.0.0.5\"]\n");
        assert_eq!(EnvCommand {}.execute(&ctx).unwrap(), Environment::Staging);
    }

    #[test]
    fn test_unlisted_address_is_development() {
        let ctx = context("[env]\naddress = \"192.168.1.1\"\nproduction = [\"10.0.0.1\"]\n");
        assert_eq!(EnvCommand {}.execute(&ctx).unwrap(), Environment::Development);
    }

    #[test]
    fn test_invalid_address_is_config_error() {
        let ctx = context("[env]\naddress = \"not-an-ip\"\n");
        assert!(matches!(
            EnvCommand {}.execute(&ctx).unwrap_err(),
            CommandError::ConfigError(_)
        ));
    }
}
