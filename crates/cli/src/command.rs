//! Command trait for the settle CLI
//!
//! Every subcommand implements [`Command`] and receives the shared
//! [`RuntimeContext`].

use crate::common::RuntimeContext;
use crate::error::Result;

/// Trait for all settle commands
///
/// Commands can specify their return type via the `Output` associated type so
/// callers (and tests) get the structured result, not only the printed summary.
pub trait Command {
    /// The type returned by this command
    type Output;

    /// Execute the command with the given runtime context
    ///
    /// # Errors
    ///
    /// Returns a `CommandError` if the command fails to execute.
    fn execute(&self, context: &RuntimeContext) -> Result<Self::Output>;
}
