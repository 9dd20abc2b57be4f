//! Apply command implementation
//!
//! Reconcile the target directory with the module tree.

use clap::Args;
use settle_core::PropertyValue;
use settle_engine::{
    Reconciler, RedbPersistentState, RunReport, STATE_DB_NAME, SystemCommand,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::{CommandError, Result};
use crate::summary;

/// Parse a `-D key=value` property
///
/// The value keeps its type: booleans and numbers are not strings.
fn parse_property(raw: &str) -> std::result::Result<(String, PropertyValue), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), PropertyValue::parse(value)))
        }
        _ => Err(CommandError::InvalidProperty(raw.to_string()).to_string()),
    }
}

/// Apply the module to the target
#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// Module directory (overrides general.module)
    #[arg(long, value_name = "DIR")]
    pub module: Option<PathBuf>,

    /// Target directory, the sync root (overrides general.target)
    #[arg(long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Set a property; repeatable, wins over [properties]
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, PropertyValue)>,

    /// Do not back up paths before overwriting or deleting them
    #[arg(long)]
    pub no_backup: bool,

    /// Print the run report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

impl Command for ApplyCommand {
    type Output = RunReport;

    fn execute(&self, context: &RuntimeContext) -> Result<RunReport> {
        let mut configuration =
            context.configuration(self.module.as_deref(), self.target.as_deref())?;
        for (key, value) in &self.properties {
            configuration = configuration.with_property(key.clone(), value.clone());
        }
        if self.no_backup {
            configuration = configuration.with_backup_dir(None);
        }

        let state = configuration
            .state_dir()
            .map(|dir| RedbPersistentState::new(dir.as_path().join(STATE_DB_NAME)))
            .transpose()?;
        if state.is_none() {
            tracing::warn!("No state directory; paths removed from the module will not be deleted");
        }

        let command = Arc::new(SystemCommand::detect());
        let mut reconciler = Reconciler::new(&configuration, command);
        if let Some(state) = &state {
            reconciler = reconciler.with_state(state);
        }
        let report = reconciler.execute()?;

        if self.json {
            let json = serde_json::to_string_pretty(&report).map_err(anyhow::Error::from)?;
            println!("{json}");
        } else {
            summary::print_summary(&report);
        }
        Ok(report)
    }
}
