//! Configuration validation logic

use super::error::ValidationError;
use crate::config::schema::{SweepPolicy, TrainParams};

/// Validate sweep parameters
///
/// Returns the first violation found. Device divisibility is checked by the
/// multi-device trainer because it depends on the device count.
pub fn validate_params(params: &TrainParams) -> Result<(), ValidationError> {
    if params.num_speakers_per_batch == 0 {
        return Err(ValidationError::InvalidSpeakersPerBatch(
            params.num_speakers_per_batch,
        ));
    }

    if params.num_segments_per_speaker == 0 {
        return Err(ValidationError::InvalidSegmentsPerSpeaker(
            params.num_segments_per_speaker,
        ));
    }

    if params.min_segment_len == 0 || params.min_segment_len > params.max_segment_len {
        return Err(ValidationError::InvalidSegmentRange {
            min: params.min_segment_len,
            max: params.max_segment_len,
        });
    }

    if params.selected_dim == Some(0) {
        return Err(ValidationError::InvalidSelectedDim(0));
    }

    if params.embedding_dim == 0 {
        return Err(ValidationError::InvalidEmbeddingDim(params.embedding_dim));
    }

    if !(0.0..1.0).contains(&params.momentum) {
        return Err(ValidationError::InvalidMomentum(params.momentum));
    }

    if let Some(clip) = params.clip_gradient_norm {
        if clip <= 0.0 || !clip.is_finite() {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }

    if params.num_parallel_datasets == 0 {
        return Err(ValidationError::InvalidParallelDatasets(
            params.num_parallel_datasets,
        ));
    }

    if params.queue_capacity == 0 {
        return Err(ValidationError::InvalidQueueCapacity(params.queue_capacity));
    }

    let sweep = &params.lr_sweep;
    if sweep.start_lr <= 0.0 || !sweep.start_lr.is_finite() {
        return Err(ValidationError::InvalidStartLr(sweep.start_lr));
    }

    if sweep.max_lr < sweep.start_lr || !sweep.max_lr.is_finite() {
        return Err(ValidationError::InvalidMaxLr {
            start_lr: sweep.start_lr,
            max_lr: sweep.max_lr,
        });
    }

    match sweep.policy {
        SweepPolicy::Geometric if sweep.growth_factor <= 1.0 || !sweep.growth_factor.is_finite() => {
            return Err(ValidationError::InvalidGrowthFactor(sweep.growth_factor));
        }
        SweepPolicy::Linear if sweep.increment <= 0.0 || !sweep.increment.is_finite() => {
            return Err(ValidationError::InvalidIncrement(sweep.increment));
        }
        _ => {}
    }

    if sweep.max_steps == Some(0) {
        return Err(ValidationError::InvalidMaxSteps(0));
    }

    Ok(())
}
