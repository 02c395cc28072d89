//! Shared compile-time state.

use scm_syntax::diag::{DiagContext, Diagnostics, Halted};

use crate::commands::{Alternator, Command, CommandDb, CommandId};
use crate::models::ModelRegistry;
use crate::options::Options;

/// Everything a compilation job needs that outlives it: options, the
/// command database, the model registry and the diagnostic sink. Built
/// once before any job starts and shared read-only (the sink's counters
/// are atomic).
pub struct ProgramContext {
    pub opt: Options,
    pub commands: CommandDb,
    pub models: ModelRegistry,
    pub diag: Diagnostics,
}

impl ProgramContext {
    pub fn new(opt: Options, commands: CommandDb, models: ModelRegistry, diag: Diagnostics) -> Self {
        Self { opt, commands, models, diag }
    }

    pub fn has_error(&self) -> bool {
        self.diag.has_errors()
    }

    /// Looks up a command the compiler itself emits (`GOTO`, `ANDOR`, ...).
    /// Missing or unsupported base commands leave nothing sensible to do,
    /// so the job halts.
    pub fn supported_or_fatal(
        &self,
        context: &DiagContext,
        name: &str,
    ) -> Result<(CommandId, &Command), Halted> {
        match self.commands.find_command(name) {
            Some((id, command)) if command.supported => Ok((id, command)),
            _ => Err(self
                .diag
                .fatal(context, &format!("command '{name}' undefined or unsupported"))),
        }
    }

    pub fn alternator_or_fatal(
        &self,
        context: &DiagContext,
        name: &str,
    ) -> Result<&Alternator, Halted> {
        match self.commands.find_alternator(name) {
            Some(alternator) => Ok(alternator),
            None => Err(self
                .diag
                .fatal(context, &format!("alternator '{name}' undefined or unsupported"))),
        }
    }
}
