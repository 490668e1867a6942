//! YAML schema for the sweep configuration file
//!
//! Only `seed`, `num_speakers_per_batch` and `num_segments_per_speaker` are
//! required; every other option has a default.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where shared parameters live during multi-device training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Parameter store co-located with the first replica's device
    #[default]
    Gpu,
    /// Parameter store in host memory, shared by all replicas
    Cpu,
}

impl std::str::FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpu" => Ok(Placement::Gpu),
            "cpu" => Ok(Placement::Cpu),
            _ => Err(format!("Unknown placement: {s}. Valid placements: gpu, cpu")),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Gpu => write!(f, "gpu"),
            Placement::Cpu => write!(f, "cpu"),
        }
    }
}

/// Learning-rate advance policy between tune periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepPolicy {
    /// lr = start_lr * growth_factor^period
    #[default]
    Geometric,
    /// lr = start_lr + increment * period
    Linear,
}

/// Learning-rate sweep settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrSweepConfig {
    /// Advance policy
    pub policy: SweepPolicy,

    /// Rate used for the first tune period
    pub start_lr: f32,

    /// Multiplier per period (geometric policy)
    pub growth_factor: f32,

    /// Additive step per period (linear policy)
    pub increment: f32,

    /// Sweep ends once the scheduled rate exceeds this value
    pub max_lr: f32,

    /// Optional hard budget of training steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

impl Default for LrSweepConfig {
    fn default() -> Self {
        Self {
            policy: SweepPolicy::Geometric,
            start_lr: 1e-5,
            // ten periods per decade
            growth_factor: 1.258_925_4,
            increment: 1e-3,
            max_lr: 1.0,
            max_steps: None,
        }
    }
}

/// Complete sweep parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    /// Seed for every randomness source of the run
    pub seed: u64,

    /// Distinct speakers drawn per batch
    pub num_speakers_per_batch: usize,

    /// Segments drawn per sampled speaker
    pub num_segments_per_speaker: usize,

    /// Shortest segment length in frames
    #[serde(default = "default_min_segment_len")]
    pub min_segment_len: usize,

    /// Longest segment length in frames
    #[serde(default = "default_max_segment_len")]
    pub max_segment_len: usize,

    /// Override of the feature dimension inferred from the corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_dim: Option<usize>,

    /// Parameter placement for multi-device training
    #[serde(default)]
    pub ps: Placement,

    /// Width of the embedding layer
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Momentum of the SGD optimizer
    #[serde(default = "default_momentum")]
    pub momentum: f32,

    /// Global gradient-norm clip threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_gradient_norm: Option<f32>,

    /// Number of background sampler workers
    #[serde(default = "default_num_parallel_datasets")]
    pub num_parallel_datasets: usize,

    /// Batches buffered per sampler worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Validation batches evaluated at the end of every tune period
    #[serde(default = "default_num_valid_batches")]
    pub num_valid_batches: usize,

    /// Write a checkpoint at the end of every tune period
    #[serde(default = "default_true")]
    pub checkpoint_every_period: bool,

    /// Learning-rate sweep settings
    #[serde(default)]
    pub lr_sweep: LrSweepConfig,
}

impl TrainParams {
    /// Create parameters with defaults for every optional field
    pub fn new(seed: u64, num_speakers_per_batch: usize, num_segments_per_speaker: usize) -> Self {
        Self {
            seed,
            num_speakers_per_batch,
            num_segments_per_speaker,
            min_segment_len: default_min_segment_len(),
            max_segment_len: default_max_segment_len(),
            selected_dim: None,
            ps: Placement::default(),
            embedding_dim: default_embedding_dim(),
            momentum: default_momentum(),
            clip_gradient_norm: None,
            num_parallel_datasets: default_num_parallel_datasets(),
            queue_capacity: default_queue_capacity(),
            num_valid_batches: default_num_valid_batches(),
            checkpoint_every_period: true,
            lr_sweep: LrSweepConfig::default(),
        }
    }

    /// Number of segments in one batch
    pub fn batch_size(&self) -> usize {
        self.num_speakers_per_batch * self.num_segments_per_speaker
    }
}

fn default_min_segment_len() -> usize {
    200
}

fn default_max_segment_len() -> usize {
    400
}

fn default_embedding_dim() -> usize {
    128
}

fn default_momentum() -> f32 {
    0.9
}

fn default_num_parallel_datasets() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    10
}

fn default_num_valid_batches() -> usize {
    4
}

fn default_true() -> bool {
    true
}
