//! CLI module for spktrain
//!
//! This module contains the command handlers and logging setup.

mod commands;
mod logging;

pub use commands::run_command;
pub use logging::{init_logging, LogLevel};

// Re-export Cli from config for convenience
pub use crate::config::Cli;
