//! spktrain CLI
//!
//! # Usage
//!
//! ```bash
//! # Sweep the learning rate on two devices
//! spktrain tune-lr --config conf/sweep.yaml -n 2 \
//!     data/train data/train/spklist data/valid data/valid/spklist exp/xvector
//!
//! # Check a config and a device count
//! spktrain validate conf/sweep.yaml -n 2
//! ```

use clap::Parser;
use spktrain::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
