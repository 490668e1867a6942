//! Speaker-embedding models
//!
//! A model is stateless: parameters live in a [`ParamSet`] owned by the
//! trainer, and the model only computes losses and gradients against it.
//! This lets replicas on different devices share one model description while
//! reading parameters from a common store.

mod params;
mod stats_pool;

pub use params::ParamSet;
pub use stats_pool::StatsPoolingClassifier;

use crate::data::Shard;
use crate::error::Result;
use rand::RngCore;

/// Loss and gradients of one forward/backward pass
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Mean cross-entropy over the shard
    pub loss: f32,
    /// Gradient of `loss` with respect to every parameter
    pub grads: ParamSet,
}

/// Trainable speaker classifier
pub trait SpeakerModel: Send + Sync {
    /// Short model name for logs
    fn name(&self) -> &str;

    /// Feature dimension the model consumes
    fn input_dim(&self) -> usize;

    /// Number of speaker classes
    fn num_classes(&self) -> usize;

    /// Fresh randomly initialized parameters
    fn init_params(&self, rng: &mut dyn RngCore) -> ParamSet;

    /// Mean loss of a shard and its gradients
    fn forward_backward(&self, params: &ParamSet, shard: &Shard<'_>) -> Result<StepOutput>;

    /// Mean loss of a shard without gradients
    fn loss(&self, params: &ParamSet, shard: &Shard<'_>) -> Result<f32>;
}
