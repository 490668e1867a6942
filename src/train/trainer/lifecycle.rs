//! Trainer lifecycle: stage graphs and state transitions

use crate::data::Batch;
use crate::error::{Error, Result};
use std::fmt;

/// Computation stage a trainer can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Forward, backward and update
    Train,
    /// Forward only
    Valid,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Train => write!(f, "train"),
            Stage::Valid => write!(f, "valid"),
        }
    }
}

/// Observable trainer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// No stage built yet
    Unbuilt,
    /// Some stages built, no step taken
    Built { train: bool, valid: bool },
    /// At least one training step taken
    Running,
    /// Resources released
    Closed,
}

/// Input contract of a built stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGraph {
    pub stage: Stage,
    pub batch_size: usize,
    pub input_dim: usize,
}

impl StageGraph {
    /// Fail when a batch does not fit the graph
    pub fn check(&self, batch: &Batch) -> Result<()> {
        if batch.size() != self.batch_size || batch.dim() != self.input_dim {
            return Err(Error::Execution(format!(
                "{} graph expects batches of {} segments with dimension {}, got {} segments with dimension {}",
                self.stage,
                self.batch_size,
                self.input_dim,
                batch.size(),
                batch.dim()
            )));
        }
        Ok(())
    }
}

/// State machine shared by every trainer
#[derive(Debug, Default)]
pub struct Lifecycle {
    train: Option<StageGraph>,
    valid: Option<StageGraph>,
    running: bool,
    closed: bool,
}

impl Lifecycle {
    /// Register a stage graph; each stage builds once
    pub fn build(&mut self, graph: StageGraph) -> Result<()> {
        if self.closed {
            return Err(Error::State(format!(
                "cannot build the {} stage of a closed trainer",
                graph.stage
            )));
        }
        let slot = match graph.stage {
            Stage::Train => &mut self.train,
            Stage::Valid => &mut self.valid,
        };
        if slot.is_some() {
            return Err(Error::State(format!(
                "the {} stage is already built",
                graph.stage
            )));
        }
        *slot = Some(graph);
        tracing::debug!(stage = %graph.stage, batch_size = graph.batch_size, "stage built");
        Ok(())
    }

    /// Graph of the train stage; marks the trainer running
    pub fn begin_train(&mut self) -> Result<StageGraph> {
        self.ensure_open()?;
        let graph = self
            .train
            .ok_or_else(|| Error::State("train step before the train stage was built".into()))?;
        self.running = true;
        Ok(graph)
    }

    /// Graph of the valid stage
    pub fn valid_graph(&self) -> Result<StageGraph> {
        self.ensure_open()?;
        self.valid
            .ok_or_else(|| Error::State("validation before the valid stage was built".into()))
    }

    /// Fail once closed
    pub fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::State("trainer is closed".into()));
        }
        Ok(())
    }

    /// Mark closed; true only for the call that closed it
    pub fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    /// Current state
    pub fn state(&self) -> TrainerState {
        if self.closed {
            TrainerState::Closed
        } else if self.running {
            TrainerState::Running
        } else if self.train.is_none() && self.valid.is_none() {
            TrainerState::Unbuilt
        } else {
            TrainerState::Built {
                train: self.train.is_some(),
                valid: self.valid.is_some(),
            }
        }
    }
}
