//! Linear learning rate sweep

use super::LRScheduler;

/// Linear sweep
///
/// Formula: lr_p = start_lr + increment * p
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSweepLR {
    start_lr: f32,
    increment: f32,
    period: usize,
}

impl LinearSweepLR {
    /// Create a sweep at period 0
    pub fn new(start_lr: f32, increment: f32) -> Self {
        Self {
            start_lr,
            increment,
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
        (f64::from(self.start_lr) + f64::from(self.increment) * period as f64) as f32
    }
}

impl LRScheduler for LinearSweepLR {
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
