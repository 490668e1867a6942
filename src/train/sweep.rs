//! Learning-rate sweep controller
//!
//! Trains with a rate that stays constant within each tune period and
//! advances by the sweep schedule at every period boundary. Every step is
//! recorded in the trace so the usable rate range can be read off the loss
//! curve afterwards; the controller itself never picks a final rate.

use super::checkpoint::{Checkpoint, Checkpointer, TrainingState};
use super::trace::LrTrace;
use super::tracker::LossTracker;
use super::trainer::Trainer;
use crate::config::LrSweepConfig;
use crate::data::{Batch, BatchSource};
use crate::error::{Error, Result};
use crate::optim::{sweep_schedule, LRScheduler};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared flag asking a running sweep to stop after the current step
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once a stop was requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a sweep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Scheduled rate exceeded `max_lr`
    ScheduleExhausted,
    /// `max_steps` reached
    StepBudget,
    /// Batch source ran dry
    CorpusExhausted,
    /// Stop flag set
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ScheduleExhausted => write!(f, "learning rate exceeded max_lr"),
            StopReason::StepBudget => write!(f, "step budget reached"),
            StopReason::CorpusExhausted => write!(f, "training data exhausted"),
            StopReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome of a sweep run
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    /// Global step the run started at
    pub start_step: usize,
    /// Steps executed by this run
    pub steps_run: usize,
    /// Rate of the last executed step
    pub last_lr: Option<f32>,
    /// Best validation loss of the run
    pub best_valid_loss: Option<f32>,
    pub stop_reason: StopReason,
    pub elapsed_secs: f64,
}

impl SweepReport {
    /// Global step after the run
    pub fn final_step(&self) -> usize {
        self.start_step + self.steps_run
    }
}

/// Fixed validation batches and the persisted best loss
struct Validation {
    batches: Vec<Batch>,
    tracker: LossTracker,
    tracker_path: PathBuf,
}

/// Drives a trainer through the sweep
pub struct SweepController<'a> {
    trainer: &'a mut dyn Trainer,
    schedule: Box<dyn LRScheduler>,
    trace: LrTrace,
    tune_period: usize,
    max_lr: f32,
    max_steps: Option<usize>,
    state: TrainingState,
    validation: Option<Validation>,
    checkpointer: Option<Checkpointer>,
    checkpoint_every_period: bool,
    last_checkpoint: usize,
    stop: StopFlag,
}

impl<'a> SweepController<'a> {
    /// Create a controller continuing from `state`
    pub fn new(
        trainer: &'a mut dyn Trainer,
        sweep: &LrSweepConfig,
        tune_period: usize,
        trace: LrTrace,
        state: TrainingState,
    ) -> Result<Self> {
        if tune_period == 0 {
            return Err(Error::config("tune_period", "must be positive"));
        }
        let schedule = sweep_schedule(sweep, state.global_step / tune_period);
        Ok(Self {
            trainer,
            schedule,
            trace,
            tune_period,
            max_lr: sweep.max_lr,
            max_steps: sweep.max_steps,
            last_checkpoint: state.global_step,
            state,
            validation: None,
            checkpointer: None,
            checkpoint_every_period: false,
            stop: StopFlag::new(),
        })
    }

    /// Evaluate `batches` at every period end and feed the tracker
    pub fn with_validation(
        mut self,
        batches: Vec<Batch>,
        tracker: LossTracker,
        tracker_path: impl Into<PathBuf>,
    ) -> Self {
        self.validation = Some(Validation {
            batches,
            tracker,
            tracker_path: tracker_path.into(),
        });
        self
    }

    /// Write checkpoints, at every period end when `every_period` is set and
    /// always when the run ends
    pub fn with_checkpointer(mut self, checkpointer: Checkpointer, every_period: bool) -> Self {
        self.checkpointer = Some(checkpointer);
        self.checkpoint_every_period = every_period;
        self
    }

    /// Stop between steps once `stop` is triggered
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Training state so far
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Run until a termination condition holds
    pub fn run(&mut self, source: &mut dyn BatchSource) -> Result<SweepReport> {
        let started = Instant::now();
        let start_step = self.state.global_step;
        let mut last_lr = None;
        let mut best_valid_loss = None;
        let mut period_loss = 0.0f64;
        let mut period_steps = 0usize;

        tracing::info!(
            start_step,
            tune_period = self.tune_period,
            start_lr = self.schedule.get_lr(),
            max_lr = self.max_lr,
            "learning rate sweep started"
        );

        let stop_reason = loop {
            if self.stop.is_set() {
                break StopReason::Interrupted;
            }
            let step = self.state.global_step;
            if self.max_steps.is_some_and(|max| step >= max) {
                break StopReason::StepBudget;
            }
            let lr = self.schedule.get_lr();
            if lr > self.max_lr {
                break StopReason::ScheduleExhausted;
            }
            let Some(batch) = source.next_batch()? else {
                break StopReason::CorpusExhausted;
            };

            self.trainer.set_lr(lr);
            let loss = self.trainer.train_step(&batch)?;
            self.trace.append(step, lr, loss)?;
            tracing::debug!(step, lr, loss, "step");

            self.state.global_step += 1;
            self.state.learning_rate = lr;
            last_lr = Some(lr);
            period_loss += f64::from(loss);
            period_steps += 1;

            if self.state.global_step % self.tune_period == 0 {
                let mean = (period_loss / period_steps as f64) as f32;
                if let Some(valid) = self.end_period(lr, mean)? {
                    best_valid_loss = Some(best_valid_loss.map_or(valid, |b: f32| b.min(valid)));
                }
                period_loss = 0.0;
                period_steps = 0;
            }
        };

        self.trace.flush()?;
        if self.last_checkpoint != self.state.global_step {
            self.checkpoint()?;
        }

        let report = SweepReport {
            start_step,
            steps_run: self.state.global_step - start_step,
            last_lr,
            best_valid_loss,
            stop_reason,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            steps = report.steps_run,
            final_step = report.final_step(),
            reason = %report.stop_reason,
            "learning rate sweep finished"
        );
        Ok(report)
    }

    /// Period bookkeeping; returns the validation loss when measured
    fn end_period(&mut self, lr: f32, mean_loss: f32) -> Result<Option<f32>> {
        let period = self.schedule.period();
        tracing::info!(
            period,
            step = self.state.global_step,
            lr = %format!("{lr:e}"),
            loss = mean_loss,
            "tune period finished"
        );

        let mut valid_loss = None;
        if let Some(validation) = self.validation.as_mut() {
            if !validation.batches.is_empty() {
                let mut total = 0.0f32;
                for batch in &validation.batches {
                    total += self.trainer.valid_loss(batch)?;
                }
                let loss = total / validation.batches.len() as f32;
                valid_loss = Some(loss);

                if self.state.best_valid_loss.is_none_or(|best| loss < best) {
                    self.state.best_valid_loss = Some(loss);
                    self.state.best_step = Some(self.state.global_step);
                }
                if validation.tracker.update(loss, period) {
                    validation.tracker.save(&validation.tracker_path)?;
                    tracing::info!(period, valid_loss = loss, "validation loss improved");
                } else {
                    tracing::info!(
                        period,
                        valid_loss = loss,
                        best = validation.tracker.best_loss(),
                        "validation loss"
                    );
                }
            }
        }

        self.state.epoch += 1;
        self.schedule.step();
        self.trace.flush()?;
        if self.checkpoint_every_period {
            self.checkpoint()?;
        }
        Ok(valid_loss)
    }

    fn checkpoint(&mut self) -> Result<()> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(());
        };
        let checkpoint = Checkpoint {
            state: self.state.clone(),
            params: self.trainer.params()?,
            slots: self.trainer.optimizer_slots(),
        };
        checkpointer.save(&checkpoint)?;
        self.last_checkpoint = self.state.global_step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SweepPolicy, TrainParams};
    use crate::model::StatsPoolingClassifier;
    use crate::train::trace::{read_trace, TRACE_FILE};
    use crate::train::trainer::{SingleDeviceTrainer, Stage};
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trainer() -> SingleDeviceTrainer {
        let model = Box::new(StatsPoolingClassifier::new(2, 4, 2).unwrap());
        let params = TrainParams::new(0, 2, 1);
        let mut t = SingleDeviceTrainer::new(model, &params, &mut StdRng::seed_from_u64(0));
        t.build(Stage::Train).unwrap();
        t.build(Stage::Valid).unwrap();
        t
    }

    fn batches(n: usize) -> Vec<Batch> {
        (0..n)
            .map(|k| {
                let features = Array3::from_shape_fn((2, 5, 2), |(i, t, d)| {
                    i as f32 + 0.1 * ((k + t + d) % 3) as f32
                });
                Batch::new(features, vec![0, 1]).unwrap()
            })
            .collect()
    }

    fn sweep(max_steps: Option<usize>) -> LrSweepConfig {
        LrSweepConfig {
            policy: SweepPolicy::Geometric,
            start_lr: 1e-3,
            growth_factor: 2.0,
            increment: 0.0,
            max_lr: 1.0,
            max_steps,
        }
    }

    #[test]
    fn test_rate_changes_only_at_period_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRACE_FILE);
        let mut t = trainer();
        let trace = LrTrace::create(&path).unwrap();
        let mut controller =
            SweepController::new(&mut t, &sweep(Some(12)), 4, trace, TrainingState::default()).unwrap();
        let report = controller.run(&mut batches(20).into_iter()).unwrap();

        assert_eq!(report.stop_reason, StopReason::StepBudget);
        assert_eq!(report.steps_run, 12);
        assert_eq!(controller.state().epoch, 3);
        drop(controller);

        let rows = read_trace(&path).unwrap();
        assert_eq!(rows.len(), 12);
        for pair in rows.windows(2) {
            assert_eq!(pair[1].step, pair[0].step + 1);
            if pair[1].step % 4 != 0 {
                assert_eq!(pair[1].lr, pair[0].lr);
            } else {
                assert!(pair[1].lr > pair[0].lr);
            }
        }
    }

    #[test]
    fn test_stops_when_schedule_exceeds_max_lr() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer();
        let trace = LrTrace::create(dir.path().join(TRACE_FILE)).unwrap();
        let mut s = sweep(None);
        s.start_lr = 0.3;
        // 0.3, 0.6, then 1.2 > 1.0
        let mut controller = SweepController::new(&mut t, &s, 2, trace, TrainingState::default()).unwrap();
        let report = controller.run(&mut batches(100).into_iter()).unwrap();
        assert_eq!(report.stop_reason, StopReason::ScheduleExhausted);
        assert_eq!(report.steps_run, 4);
        assert_eq!(report.last_lr, Some(0.6));
    }

    #[test]
    fn test_exhausted_source_ends_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer();
        let trace = LrTrace::create(dir.path().join(TRACE_FILE)).unwrap();
        let mut controller =
            SweepController::new(&mut t, &sweep(None), 4, trace, TrainingState::default()).unwrap();
        let report = controller.run(&mut batches(6).into_iter()).unwrap();
        assert_eq!(report.stop_reason, StopReason::CorpusExhausted);
        assert_eq!(report.steps_run, 6);
    }

    #[test]
    fn test_stop_flag_interrupts() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer();
        let trace = LrTrace::create(dir.path().join(TRACE_FILE)).unwrap();
        let stop = StopFlag::new();
        stop.trigger();
        let mut controller = SweepController::new(&mut t, &sweep(None), 4, trace, TrainingState::default())
            .unwrap()
            .with_stop_flag(stop);
        let report = controller.run(&mut batches(6).into_iter()).unwrap();
        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.steps_run, 0);
    }

    #[test]
    fn test_validation_feeds_tracker_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let tracker_path = dir.path().join("valid_loss");
        let mut t = trainer();
        let trace = LrTrace::create(dir.path().join(TRACE_FILE)).unwrap();
        let mut controller = SweepController::new(&mut t, &sweep(Some(8)), 4, trace, TrainingState::default())
            .unwrap()
            .with_validation(batches(2), LossTracker::new(), &tracker_path)
            .with_checkpointer(Checkpointer::new(dir.path().join("nnet")), true);
        let report = controller.run(&mut batches(20).into_iter()).unwrap();

        assert!(report.best_valid_loss.is_some());
        let tracker = LossTracker::load(&tracker_path).unwrap();
        assert!(tracker.best_loss().is_finite());
        assert!(tracker.best_epoch().is_some());

        let latest = Checkpointer::new(dir.path().join("nnet")).load_latest().unwrap().unwrap();
        assert_eq!(latest.state.global_step, 8);
        assert_eq!(latest.state.epoch, 2);
    }

    #[test]
    fn test_resumed_schedule_starts_at_saved_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer();
        let trace = LrTrace::create(dir.path().join(TRACE_FILE)).unwrap();
        let state = TrainingState {
            global_step: 8,
            epoch: 2,
            ..TrainingState::default()
        };
        let mut controller = SweepController::new(&mut t, &sweep(Some(9)), 4, trace, state).unwrap();
        let report = controller.run(&mut batches(5).into_iter()).unwrap();
        assert_eq!(report.start_step, 8);
        assert_eq!(report.final_step(), 9);
        // period 2 of a doubling schedule from 1e-3
        assert_relative_eq!(report.last_lr.unwrap(), 4e-3, max_relative = 1e-6);
    }

    #[test]
    fn test_zero_tune_period_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer();
        let trace = LrTrace::create(dir.path().join(TRACE_FILE)).unwrap();
        let err = SweepController::new(&mut t, &sweep(None), 0, trace, TrainingState::default())
            .err()
            .unwrap();
        assert!(err.is_config_error());
    }
}
