//! Learning rate schedulers
//!
//! Sweep schedules hold the rate constant within a tune period and advance it
//! once per period:
//! - `GeometricSweepLR` - multiply by a growth factor every period
//! - `LinearSweepLR` - add a fixed increment every period

mod geometric;
mod linear;


pub use geometric::GeometricSweepLR;
pub use linear::LinearSweepLR;

use crate::config::{LrSweepConfig, SweepPolicy};

/// Learning rate scheduler trait
pub trait LRScheduler: Send {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (called once at the end of every tune period)
    fn step(&mut self);

    /// Index of the current period
    fn period(&self) -> usize;
}

/// Build the sweep schedule described by `sweep`, positioned at `period`
pub fn sweep_schedule(sweep: &LrSweepConfig, period: usize) -> Box<dyn LRScheduler> {
    match sweep.policy {
        SweepPolicy::Geometric => Box::new(
            GeometricSweepLR::new(sweep.start_lr, sweep.growth_factor).starting_at(period),
        ),
        SweepPolicy::Linear => {
            Box::new(LinearSweepLR::new(sweep.start_lr, sweep.increment).starting_at(period))
        }
    }
}
