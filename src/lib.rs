//! spktrain: learning-rate sweeps for speaker-embedding networks
//!
//! Trains a speaker classifier while raising the learning rate at fixed step
//! intervals and records `(step, lr, loss)` for every step, so a usable rate
//! range can be read off the loss curve before a full training run.
//!
//! # Modules
//!
//! - [`config`]: YAML parameters, validation and the command-line surface
//! - [`data`]: corpus access, speaker lists, class-balanced batch sampling
//! - [`model`]: parameter sets and the speaker classifier
//! - [`optim`]: SGD with momentum, gradient clipping, sweep schedules
//! - [`train`]: trainers, the sweep controller and the end-to-end pipeline

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod optim;
pub mod train;

pub use error::{Error, Result};
