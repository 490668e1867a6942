//! Learning-rate sweep training
//!
//! This module provides:
//! - Single- and multi-device trainers with a build/step/close lifecycle
//! - The sweep controller driving a trainer through rising learning rates
//! - Step trace, validation-loss tracker and checkpoint persistence
//! - [`run_sweep`], the end-to-end pipeline used by the `tune-lr` command
//!
//! # Example
//!
//! ```no_run
//! use spktrain::config::TrainParams;
//! use spktrain::train::{run_sweep, DataSet, StopFlag, SweepRequest};
//!
//! let request = SweepRequest {
//!     params: TrainParams::new(0, 64, 1),
//!     train: DataSet::new("data/train", "data/train/spklist"),
//!     valid: None,
//!     model_dir: "exp/lr_sweep".into(),
//!     num_devices: 1,
//!     tune_period: 100,
//!     stop: StopFlag::new(),
//! };
//! let report = run_sweep(&request)?;
//! println!("{} steps, stopped because {}", report.steps_run, report.stop_reason);
//! # Ok::<(), spktrain::Error>(())
//! ```

mod checkpoint;
mod pipeline;
mod sweep;
mod trace;
mod tracker;
pub mod trainer;

pub use checkpoint::{Checkpoint, Checkpointer, TrainingState};
pub use pipeline::{run_sweep, DataSet, SweepRequest, FEATURE_DIM_FILE, NNET_DIR, TRACKER_FILE};
pub use sweep::{StopFlag, StopReason, SweepController, SweepReport};
pub use trace::{read_trace, LrTrace, TraceRow, TRACE_FILE};
pub use tracker::LossTracker;
pub use trainer::{
    build_trainer, check_device_split, MultiDeviceTrainer, SingleDeviceTrainer, Stage, Trainer,
    TrainerState,
};
