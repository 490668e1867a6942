//! Validation error types
//!
//! Defines all validation error variants for sweep parameters.

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid num_speakers_per_batch: {0} (must be > 0)")]
    InvalidSpeakersPerBatch(usize),

    #[error("Invalid num_segments_per_speaker: {0} (must be > 0)")]
    InvalidSegmentsPerSpeaker(usize),

    #[error("Invalid segment length range: [{min}, {max}] (need 0 < min <= max)")]
    InvalidSegmentRange { min: usize, max: usize },

    #[error("Invalid selected_dim: {0} (must be > 0)")]
    InvalidSelectedDim(usize),

    #[error("Invalid embedding_dim: {0} (must be > 0)")]
    InvalidEmbeddingDim(usize),

    #[error("Invalid momentum: {0} (must be in [0.0, 1.0))")]
    InvalidMomentum(f32),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid num_parallel_datasets: {0} (must be > 0)")]
    InvalidParallelDatasets(usize),

    #[error("Invalid queue_capacity: {0} (must be > 0)")]
    InvalidQueueCapacity(usize),

    #[error("Invalid start_lr: {0} (must be > 0.0)")]
    InvalidStartLr(f32),

    #[error("Invalid max_lr: {max_lr} (must be >= start_lr {start_lr})")]
    InvalidMaxLr { start_lr: f32, max_lr: f32 },

    #[error("Invalid growth_factor: {0} (must be > 1.0 so the rate advances)")]
    InvalidGrowthFactor(f32),

    #[error("Invalid increment: {0} (must be > 0.0 so the rate advances)")]
    InvalidIncrement(f32),

    #[error("Invalid max_steps: {0} (must be > 0)")]
    InvalidMaxSteps(usize),
}

impl ValidationError {
    /// Name of the offending option
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidSpeakersPerBatch(_) => "num_speakers_per_batch",
            Self::InvalidSegmentsPerSpeaker(_) => "num_segments_per_speaker",
            Self::InvalidSegmentRange { .. } => "min_segment_len/max_segment_len",
            Self::InvalidSelectedDim(_) => "selected_dim",
            Self::InvalidEmbeddingDim(_) => "embedding_dim",
            Self::InvalidMomentum(_) => "momentum",
            Self::InvalidGradClip(_) => "clip_gradient_norm",
            Self::InvalidParallelDatasets(_) => "num_parallel_datasets",
            Self::InvalidQueueCapacity(_) => "queue_capacity",
            Self::InvalidStartLr(_) => "lr_sweep.start_lr",
            Self::InvalidMaxLr { .. } => "lr_sweep.max_lr",
            Self::InvalidGrowthFactor(_) => "lr_sweep.growth_factor",
            Self::InvalidIncrement(_) => "lr_sweep.increment",
            Self::InvalidMaxSteps(_) => "lr_sweep.max_steps",
        }
    }
}

impl From<ValidationError> for crate::Error {
    fn from(err: ValidationError) -> Self {
        crate::Error::config(err.field(), err.to_string())
    }
}
