//! Optimizer trait

use crate::error::Result;
use crate::model::ParamSet;

/// Trait for optimization algorithms
pub trait Optimizer: Send {
    /// Apply one update of `params` from `grads`
    fn step(&mut self, params: &mut ParamSet, grads: &ParamSet) -> Result<()>;

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Per-parameter optimizer state, if any has accumulated
    fn slots(&self) -> Option<&ParamSet>;

    /// Restore state saved from [`Optimizer::slots`]
    fn load_slots(&mut self, slots: ParamSet);
}
