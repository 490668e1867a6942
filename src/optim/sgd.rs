//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::error::Result;
use crate::model::ParamSet;

/// SGD optimizer with optional momentum
///
/// With momentum the update is `v = momentum * v + grad; param -= lr * v`.
/// The velocity does not depend on the learning rate, so changing the rate
/// between steps takes effect immediately.
#[derive(Debug, Clone)]
pub struct SGD {
    lr: f32,
    momentum: f32,
    velocity: Option<ParamSet>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocity: None,
        }
    }

    /// Momentum coefficient
    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut ParamSet, grads: &ParamSet) -> Result<()> {
        if self.momentum > 0.0 {
            let momentum = self.momentum;
            let velocity = self.velocity.get_or_insert_with(|| grads.zeros_like());
            velocity.zip_apply(grads, |v, g| *v = momentum * *v + g)?;
            params.add_scaled(-self.lr, velocity)
        } else {
            params.add_scaled(-self.lr, grads)
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn slots(&self) -> Option<&ParamSet> {
        self.velocity.as_ref()
    }

    fn load_slots(&mut self, slots: ParamSet) {
        self.velocity = Some(slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn single(v: f32) -> ParamSet {
        ParamSet::new().with("w", array![[v]])
    }

    fn value(p: &ParamSet) -> f32 {
        p.get("w").unwrap()[[0, 0]]
    }

    #[test]
    fn test_plain_sgd() {
        let mut opt = SGD::new(0.1, 0.0);
        let mut params = single(1.0);
        opt.step(&mut params, &single(2.0)).unwrap();
        assert_abs_diff_eq!(value(&params), 0.8, epsilon = 1e-6);
        assert!(opt.slots().is_none());
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut opt = SGD::new(0.1, 0.9);
        let mut params = single(1.0);
        opt.step(&mut params, &single(1.0)).unwrap();
        assert_abs_diff_eq!(value(&params), 0.9, epsilon = 1e-6);
        // v = 0.9 * 1 + 1 = 1.9
        opt.step(&mut params, &single(1.0)).unwrap();
        assert_abs_diff_eq!(value(&params), 0.71, epsilon = 1e-6);
        assert_abs_diff_eq!(value(opt.slots().unwrap()), 1.9, epsilon = 1e-6);
    }

    #[test]
    fn test_set_lr_applies_to_next_step() {
        let mut opt = SGD::new(0.1, 0.5);
        let mut params = single(0.0);
        opt.step(&mut params, &single(1.0)).unwrap();
        opt.set_lr(1.0);
        assert_eq!(opt.lr(), 1.0);
        opt.step(&mut params, &single(0.0)).unwrap();
        // -0.1 - 1.0 * 0.5
        assert_abs_diff_eq!(value(&params), -0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_restored_slots_continue_momentum() {
        let mut opt = SGD::new(1.0, 0.5);
        opt.load_slots(single(2.0));
        let mut params = single(0.0);
        opt.step(&mut params, &single(0.0)).unwrap();
        assert_abs_diff_eq!(value(&params), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_layout_mismatch_is_error() {
        let mut opt = SGD::new(0.1, 0.9);
        let mut params = single(0.0);
        let grads = ParamSet::new().with("w", array![[1.0, 2.0]]);
        assert!(opt.step(&mut params, &grads).is_err());
    }
}
