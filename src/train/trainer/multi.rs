//! Synchronous data-parallel trainer
//!
//! Each step splits the batch into one contiguous shard per device, runs the
//! replicas on a rayon pool with one thread per device, averages losses and
//! gradients, then applies a single update to the parameter store.

use super::lifecycle::{Lifecycle, Stage, StageGraph, TrainerState};
use super::placement::ParameterStore;
use super::{apply_update, check_device_split, restore_into, Trainer};
use crate::config::{Placement, TrainParams};
use crate::data::{Batch, Shard};
use crate::error::{Error, Result};
use crate::model::{ParamSet, SpeakerModel, StepOutput};
use crate::optim::{Optimizer, SGD};
use rand::RngCore;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Multi-device trainer
pub struct MultiDeviceTrainer {
    model: Box<dyn SpeakerModel>,
    store: ParameterStore,
    optimizer: Box<dyn Optimizer>,
    pool: Option<ThreadPool>,
    clip: Option<f32>,
    batch_size: usize,
    num_devices: usize,
    lifecycle: Lifecycle,
}

impl MultiDeviceTrainer {
    /// Create a trainer over `num_devices` devices
    ///
    /// The batch size must divide evenly by `num_devices`; this is checked
    /// before the device pool is created.
    pub fn new(
        model: Box<dyn SpeakerModel>,
        train: &TrainParams,
        num_devices: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let batch_size = train.batch_size();
        check_device_split(batch_size, num_devices)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(num_devices)
            .thread_name(|i| format!("device-{i}"))
            .build()
            .map_err(|e| Error::Execution(format!("failed to start {num_devices} device workers: {e}")))?;

        if train.ps == Placement::Cpu {
            tracing::warn!(
                "parameters are placed in host memory; every step copies them to {num_devices} devices"
            );
        }

        let store = ParameterStore::new(train.ps, model.init_params(rng));
        tracing::info!(
            devices = num_devices,
            shard_size = batch_size / num_devices,
            placement = %train.ps,
            owner = ?store.owner(),
            "multi-device trainer created"
        );

        Ok(Self {
            model,
            store,
            optimizer: Box::new(SGD::new(train.lr_sweep.start_lr, train.momentum)),
            pool: Some(pool),
            clip: train.clip_gradient_norm,
            batch_size,
            num_devices,
            lifecycle: Lifecycle::default(),
        })
    }

    /// Placement of the parameter store
    pub fn placement(&self) -> Placement {
        self.store.placement()
    }

    /// Run `replica` on every shard, one per device, and wait for all
    fn fan_out<T, F>(&self, batch: &Batch, replica: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&dyn SpeakerModel, &ParamSet, &Shard<'_>) -> Result<T> + Sync,
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| Error::State("device pool already released".into()))?;
        let shards = batch.shards(self.num_devices)?;
        let model = self.model.as_ref();
        let store = &self.store;

        let results: Vec<Result<T>> = pool.install(|| {
            shards
                .par_iter()
                .enumerate()
                .map(|(device, shard)| {
                    let params = store.read()?;
                    replica(model, &params, shard).inspect_err(|e| {
                        tracing::debug!(device, error = %e, "replica failed");
                    })
                })
                .collect()
        });
        // a single failed replica aborts the step
        results.into_iter().collect()
    }
}

impl Trainer for MultiDeviceTrainer {
    fn build(&mut self, stage: Stage) -> Result<()> {
        self.lifecycle.build(StageGraph {
            stage,
            batch_size: self.batch_size,
            input_dim: self.model.input_dim(),
        })
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        self.lifecycle.begin_train()?.check(batch)?;

        let outputs: Vec<StepOutput> =
            self.fan_out(batch, |model, params, shard| model.forward_backward(params, shard))?;

        let loss = outputs.iter().map(|o| o.loss).sum::<f32>() / outputs.len() as f32;
        let grads: Vec<ParamSet> = outputs.into_iter().map(|o| o.grads).collect();
        let grads = ParamSet::mean(&grads)?;

        let optimizer = self.optimizer.as_mut();
        let clip = self.clip;
        self.store
            .update(|params| apply_update(optimizer, params, grads, clip))?;
        Ok(loss)
    }

    fn valid_loss(&mut self, batch: &Batch) -> Result<f32> {
        self.lifecycle.valid_graph()?.check(batch)?;
        let losses = self.fan_out(batch, |model, params, shard| model.loss(params, shard))?;
        Ok(losses.iter().sum::<f32>() / losses.len() as f32)
    }

    fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.optimizer.set_lr(lr);
    }

    fn params(&self) -> Result<ParamSet> {
        self.store.snapshot()
    }

    fn optimizer_slots(&self) -> Option<ParamSet> {
        self.optimizer.slots().cloned()
    }

    fn restore(&mut self, params: ParamSet, slots: Option<ParamSet>) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let optimizer = self.optimizer.as_mut();
        self.store
            .update(|current| restore_into(optimizer, current, params, slots))
    }

    fn state(&self) -> TrainerState {
        self.lifecycle.state()
    }

    fn num_devices(&self) -> usize {
        self.num_devices
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            // dropping the pool joins the device threads
            self.pool.take();
            tracing::debug!(devices = self.num_devices, "multi-device trainer closed");
        }
    }
}

impl Drop for MultiDeviceTrainer {
    fn drop(&mut self) {
        self.close();
    }
}
