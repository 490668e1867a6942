//! Geometric learning rate sweep

use super::LRScheduler;

/// Geometric sweep
///
/// Formula: lr_p = start_lr * growth_factor^p
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricSweepLR {
    start_lr: f32,
    growth_factor: f32,
    period: usize,
}

impl GeometricSweepLR {
    /// Create a sweep at period 0
    pub fn new(start_lr: f32, growth_factor: f32) -> Self {
        Self {
            start_lr,
            growth_factor,
            period: 0,
        }
    }

    /// Position the sweep at `period`
    pub fn starting_at(mut self, period: usize) -> Self {
        self.period = period;
        self
    }

    /// Rate of an arbitrary period
    pub fn lr_at(&self, period: usize) -> f32 {
        // f64 keeps long sweeps from drifting
        (f64::from(self.start_lr) * f64::from(self.growth_factor).powf(period as f64)) as f32
    }
}

impl LRScheduler for GeometricSweepLR {
    fn get_lr(&self) -> f32 {
        self.lr_at(self.period)
    }

    fn step(&mut self) {
        self.period += 1;
    }

    fn period(&self) -> usize {
        self.period
    }
}
