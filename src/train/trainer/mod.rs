//! Trainer abstraction for single- and multi-device training
//!
//! A trainer owns the parameters and optimizer of one run and exposes a
//! build/step/close lifecycle:
//! - `build(stage)` once per stage before use
//! - `train_step` for forward, backward and one synchronized update
//! - `valid_loss` for forward-only evaluation
//! - `close` to release device resources (also on drop)
//!
//! [`build_trainer`] picks the implementation from the device count.

mod lifecycle;
mod multi;
mod placement;
mod single;

pub use lifecycle::{Stage, StageGraph, TrainerState};
pub use multi::MultiDeviceTrainer;
pub use placement::{ParameterStore, ParamsRef};
pub use single::SingleDeviceTrainer;

use crate::config::TrainParams;
use crate::data::Batch;
use crate::error::{Error, Result};
use crate::model::{ParamSet, SpeakerModel};
use crate::optim::{clip_grad_norm, Optimizer};
use rand::RngCore;

/// Common interface of single- and multi-device trainers
pub trait Trainer {
    /// Construct the graph of a stage; each stage builds exactly once
    fn build(&mut self, stage: Stage) -> Result<()>;

    /// One forward/backward/update on a batch, returning the mean loss
    fn train_step(&mut self, batch: &Batch) -> Result<f32>;

    /// Mean loss of a batch without updating parameters
    fn valid_loss(&mut self, batch: &Batch) -> Result<f32>;

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate for subsequent steps
    fn set_lr(&mut self, lr: f32);

    /// Copy of the current parameters
    fn params(&self) -> Result<ParamSet>;

    /// Copy of the optimizer state
    fn optimizer_slots(&self) -> Option<ParamSet>;

    /// Replace parameters and optimizer state, e.g. from a checkpoint
    fn restore(&mut self, params: ParamSet, slots: Option<ParamSet>) -> Result<()>;

    /// Lifecycle state
    fn state(&self) -> TrainerState;

    /// Number of devices a step is spread over
    fn num_devices(&self) -> usize;

    /// Release resources; idempotent
    fn close(&mut self);
}

/// Fail unless a batch of `batch_size` splits evenly over `num_devices`
pub fn check_device_split(batch_size: usize, num_devices: usize) -> Result<()> {
    if num_devices == 0 {
        return Err(Error::config("num_gpus", "at least one device is required"));
    }
    if batch_size % num_devices != 0 {
        return Err(Error::IndivisibleBatch {
            batch_size,
            num_devices,
        });
    }
    Ok(())
}

/// Create the trainer matching `num_devices`
pub fn build_trainer(
    model: Box<dyn SpeakerModel>,
    params: &TrainParams,
    num_devices: usize,
    rng: &mut dyn RngCore,
) -> Result<Box<dyn Trainer>> {
    check_device_split(params.batch_size(), num_devices)?;
    if num_devices == 1 {
        Ok(Box::new(SingleDeviceTrainer::new(model, params, rng)))
    } else {
        Ok(Box::new(MultiDeviceTrainer::new(model, params, num_devices, rng)?))
    }
}

/// Clip, check and apply averaged gradients
fn apply_update(
    optimizer: &mut dyn Optimizer,
    params: &mut ParamSet,
    mut grads: ParamSet,
    clip: Option<f32>,
) -> Result<()> {
    if let Some(max_norm) = clip {
        let norm = clip_grad_norm(&mut grads, max_norm);
        tracing::trace!(norm, max_norm, "gradient norm");
    }
    if !grads.is_finite() {
        return Err(Error::Execution(
            "gradient contains NaN or infinite values".into(),
        ));
    }
    optimizer.step(params, &grads)
}

/// Restore into `params` after checking the layout matches
fn restore_into(
    optimizer: &mut dyn Optimizer,
    params: &mut ParamSet,
    restored: ParamSet,
    slots: Option<ParamSet>,
) -> Result<()> {
    params.check_layout(&restored)?;
    if let Some(slots) = &slots {
        restored.check_layout(slots)?;
    }
    *params = restored;
    if let Some(slots) = slots {
        optimizer.load_slots(slots);
    }
    Ok(())
}
