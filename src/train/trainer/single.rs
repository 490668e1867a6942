//! Trainer running every step on one device

use super::lifecycle::{Lifecycle, Stage, StageGraph, TrainerState};
use super::{apply_update, restore_into, Trainer};
use crate::config::TrainParams;
use crate::data::Batch;
use crate::error::Result;
use crate::model::{ParamSet, SpeakerModel};
use crate::optim::{Optimizer, SGD};
use rand::RngCore;

/// Single-device trainer
pub struct SingleDeviceTrainer {
    model: Box<dyn SpeakerModel>,
    params: ParamSet,
    optimizer: Box<dyn Optimizer>,
    clip: Option<f32>,
    batch_size: usize,
    lifecycle: Lifecycle,
}

impl SingleDeviceTrainer {
    /// Create a trainer with freshly initialized parameters
    pub fn new(model: Box<dyn SpeakerModel>, train: &TrainParams, rng: &mut dyn RngCore) -> Self {
        let params = model.init_params(rng);
        tracing::debug!(
            model = model.name(),
            parameters = params.num_elements(),
            "single-device trainer created"
        );
        Self {
            model,
            params,
            optimizer: Box::new(SGD::new(train.lr_sweep.start_lr, train.momentum)),
            clip: train.clip_gradient_norm,
            batch_size: train.batch_size(),
            lifecycle: Lifecycle::default(),
        }
    }
}

impl Trainer for SingleDeviceTrainer {
    fn build(&mut self, stage: Stage) -> Result<()> {
        self.lifecycle.build(StageGraph {
            stage,
            batch_size: self.batch_size,
            input_dim: self.model.input_dim(),
        })
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        self.lifecycle.begin_train()?.check(batch)?;
        let out = self.model.forward_backward(&self.params, &batch.as_shard())?;
        apply_update(self.optimizer.as_mut(), &mut self.params, out.grads, self.clip)?;
        Ok(out.loss)
    }

    fn valid_loss(&mut self, batch: &Batch) -> Result<f32> {
        self.lifecycle.valid_graph()?.check(batch)?;
        self.model.loss(&self.params, &batch.as_shard())
    }

    fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.optimizer.set_lr(lr);
    }

    fn params(&self) -> Result<ParamSet> {
        Ok(self.params.clone())
    }

    fn optimizer_slots(&self) -> Option<ParamSet> {
        self.optimizer.slots().cloned()
    }

    fn restore(&mut self, params: ParamSet, slots: Option<ParamSet>) -> Result<()> {
        self.lifecycle.ensure_open()?;
        restore_into(self.optimizer.as_mut(), &mut self.params, params, slots)
    }

    fn state(&self) -> TrainerState {
        self.lifecycle.state()
    }

    fn num_devices(&self) -> usize {
        1
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            tracing::debug!("single-device trainer closed");
        }
    }
}

impl Drop for SingleDeviceTrainer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::StatsPoolingClassifier;
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trainer() -> SingleDeviceTrainer {
        let model = Box::new(StatsPoolingClassifier::new(2, 4, 3).unwrap());
        let mut params = TrainParams::new(0, 2, 2);
        params.lr_sweep.start_lr = 0.1;
        let mut rng = StdRng::seed_from_u64(3);
        SingleDeviceTrainer::new(model, &params, &mut rng)
    }

    fn batch() -> Batch {
        let labels = vec![0, 0, 2, 2];
        let features =
            Array3::from_shape_fn((4, 6, 2), |(i, t, d)| labels[i] as f32 + 0.1 * ((t + d) % 3) as f32);
        Batch::new(features, labels).unwrap()
    }

    #[test]
    fn test_step_requires_build() {
        let mut t = trainer();
        assert!(matches!(t.train_step(&batch()), Err(Error::State(_))));
        assert!(matches!(t.valid_loss(&batch()), Err(Error::State(_))));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut t = trainer();
        t.build(Stage::Train).unwrap();
        t.build(Stage::Valid).unwrap();
        let b = batch();
        let before = t.valid_loss(&b).unwrap();
        for _ in 0..30 {
            t.train_step(&b).unwrap();
        }
        assert_eq!(t.state(), TrainerState::Running);
        assert!(t.valid_loss(&b).unwrap() < before);
        assert!(t.optimizer_slots().is_some());
    }

    #[test]
    fn test_wrong_batch_size_is_execution_error() {
        let mut t = trainer();
        t.build(Stage::Train).unwrap();
        let small = Batch::new(Array3::zeros((2, 6, 2)), vec![0, 1]).unwrap();
        assert!(matches!(t.train_step(&small), Err(Error::Execution(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut t = trainer();
        t.build(Stage::Train).unwrap();
        t.close();
        t.close();
        assert_eq!(t.state(), TrainerState::Closed);
        assert!(t.train_step(&batch()).is_err());
        assert!(t.build(Stage::Valid).is_err());
    }

    #[test]
    fn test_restore_replaces_params() {
        let mut t = trainer();
        let mut target = t.params().unwrap();
        target.scale(0.0);
        t.restore(target.clone(), Some(target.zeros_like())).unwrap();
        assert_eq!(t.params().unwrap(), target);
        assert!(t.optimizer_slots().is_some());
    }

    #[test]
    fn test_restore_rejects_other_layout() {
        let mut t = trainer();
        let other = ParamSet::new().with("w", ndarray::Array2::zeros((1, 1)));
        assert!(t.restore(other, None).is_err());
    }
}
