//! CLI command implementations

mod tune_lr;
mod validate;

use crate::cli::logging::{init_logging, LogLevel};
use crate::config::{Cli, Command};
use crate::error::Result;

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<()> {
    init_logging(LogLevel::from_flags(cli.quiet, cli.verbose));

    match cli.command {
        Command::TuneLr(args) => tune_lr::run_tune_lr(args),
        Command::Validate(args) => validate::run_validate(args),
    }
}
