//! Command-line surface
//!
//! # Usage
//!
//! ```bash
//! spktrain tune-lr --config conf/sweep.yaml -n 2 --ps cpu \
//!     data/train data/train/spklist data/valid data/valid/spklist exp/xvector
//! spktrain validate conf/sweep.yaml --num-gpus 3
//! ```

use super::schema::{Placement, TrainParams};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// spktrain: learning-rate sweeps for speaker-embedding networks
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "spktrain")]
#[command(version)]
#[command(about = "Sweep the learning rate of a speaker-embedding network and record the loss trace")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the learning-rate sweep
    TuneLr(TuneLrArgs),

    /// Validate a configuration file (and a device count) without training
    Validate(ValidateArgs),
}

/// Arguments for the tune-lr command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TuneLrArgs {
    /// Where to put the parameters (only takes effect with multiple devices);
    /// overrides `ps` from the configuration file
    #[arg(long)]
    pub ps: Option<Placement>,

    /// How many steps per learning rate
    #[arg(long, default_value_t = 100)]
    pub tune_period: usize,

    /// The configuration file
    #[arg(long)]
    pub config: PathBuf,

    /// The number of devices used to train the model
    #[arg(short = 'n', long, default_value_t = 1)]
    pub num_gpus: usize,

    /// Override the step budget of the sweep
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// The data directory of the training set
    pub train_dir: PathBuf,

    /// The speaker list mapping TRAINING speakers to indices
    pub train_spklist: PathBuf,

    /// The data directory of the validation set
    pub valid_dir: PathBuf,

    /// The speaker list mapping VALID speakers to indices
    pub valid_spklist: PathBuf,

    /// The output model directory
    pub model: PathBuf,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Device count to check the batch split against
    #[arg(short = 'n', long, default_value_t = 1)]
    pub num_gpus: usize,
}

/// Parse command line arguments
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to loaded parameters
pub fn apply_overrides(params: &mut TrainParams, args: &TuneLrArgs) {
    if let Some(ps) = args.ps {
        params.ps = ps;
    }
    if let Some(max_steps) = args.max_steps {
        params.lr_sweep.max_steps = Some(max_steps);
    }
    if let Some(seed) = args.seed {
        params.seed = seed;
    }
}
