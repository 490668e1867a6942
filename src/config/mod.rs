//! Sweep configuration
//!
//! YAML schema, loading, validation and the command-line surface.

mod cli;
mod loader;
mod schema;
pub mod validate;

pub use cli::{apply_overrides, parse_args, Cli, Command, TuneLrArgs, ValidateArgs};
pub use loader::{load_params, save_params_snapshot, CONFIG_SNAPSHOT};
pub use schema::{LrSweepConfig, Placement, SweepPolicy, TrainParams};
pub use validate::{validate_params, ValidationError};
