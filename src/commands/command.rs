//! Command trait definition for CLI commands.
//!
//! Every dupsort subcommand implements [`Command`]; the subcommand enum in
//! `main.rs` dispatches to it through `enum_dispatch`.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all dupsort CLI commands.
///
/// The `command_line` parameter contains the full command invocation.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
