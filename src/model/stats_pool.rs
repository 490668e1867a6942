//! Statistics-pooling speaker classifier
//!
//! Frames are pooled into per-segment mean and standard deviation, passed
//! through one ReLU embedding layer and a softmax classification head.

use super::{ParamSet, SpeakerModel, StepOutput};
use crate::data::Shard;
use crate::error::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView3, Axis, Zip};
use rand::{Rng, RngCore};

const VAR_FLOOR: f32 = 1e-5;

const EMBEDDING_WEIGHTS: &str = "embedding_weights";
const EMBEDDING_BIAS: &str = "embedding_bias";
const OUTPUT_WEIGHTS: &str = "output_weights";
const OUTPUT_BIAS: &str = "output_bias";

/// Mean+std pooling, ReLU embedding layer, softmax over speakers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsPoolingClassifier {
    input_dim: usize,
    embedding_dim: usize,
    num_classes: usize,
}

/// Activations kept for the backward pass
struct Forward {
    pooled: Array2<f32>,
    hidden_pre: Array2<f32>,
    hidden: Array2<f32>,
    probs: Array2<f32>,
    loss: f32,
}

impl StatsPoolingClassifier {
    /// Create a classifier
    pub fn new(input_dim: usize, embedding_dim: usize, num_classes: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::config("selected_dim", "feature dimension must be positive"));
        }
        if embedding_dim == 0 {
            return Err(Error::config("embedding_dim", "must be positive"));
        }
        if num_classes == 0 {
            return Err(Error::Data("the training speaker list is empty".into()));
        }
        Ok(Self {
            input_dim,
            embedding_dim,
            num_classes,
        })
    }

    /// Width of the embedding layer
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn expected_shapes(&self) -> [(&'static str, [usize; 2]); 4] {
        [
            (EMBEDDING_WEIGHTS, [2 * self.input_dim, self.embedding_dim]),
            (EMBEDDING_BIAS, [1, self.embedding_dim]),
            (OUTPUT_WEIGHTS, [self.embedding_dim, self.num_classes]),
            (OUTPUT_BIAS, [1, self.num_classes]),
        ]
    }

    fn unpack<'p>(&self, params: &'p ParamSet) -> Result<[&'p Array2<f32>; 4]> {
        let expected = self.expected_shapes();
        if params.len() != expected.len() {
            return Err(Error::Execution(format!(
                "{} expects {} parameter tensors, got {}",
                self.name(),
                expected.len(),
                params.len()
            )));
        }
        let mut out = Vec::with_capacity(expected.len());
        for (i, (name, shape)) in expected.iter().enumerate() {
            let tensor = params
                .tensor(i)
                .filter(|t| t.shape() == shape)
                .ok_or_else(|| {
                    Error::Execution(format!(
                        "parameter '{name}' is missing or does not have shape {shape:?}"
                    ))
                })?;
            out.push(tensor);
        }
        Ok([out[0], out[1], out[2], out[3]])
    }

    fn check_shard(&self, shard: &Shard<'_>) -> Result<()> {
        let (segments, frames, dim) = shard.features.dim();
        if segments == 0 || frames == 0 {
            return Err(Error::Execution(format!(
                "empty shard: {segments} segments of {frames} frames"
            )));
        }
        if dim != self.input_dim {
            return Err(Error::Execution(format!(
                "feature dimension mismatch: model expects {}, shard has {dim}",
                self.input_dim
            )));
        }
        if let Some(&label) = shard.labels.iter().find(|&&l| l >= self.num_classes) {
            return Err(Error::Data(format!(
                "label {label} is out of range for {} speaker classes",
                self.num_classes
            )));
        }
        Ok(())
    }

    fn forward(&self, params: &ParamSet, shard: &Shard<'_>) -> Result<Forward> {
        self.check_shard(shard)?;
        let [w1, b1, w2, b2] = self.unpack(params)?;

        let pooled = stats_pool(shard.features);
        let hidden_pre = pooled.dot(w1) + b1;
        let hidden = hidden_pre.mapv(|v| v.max(0.0));
        let logits = hidden.dot(w2) + b2;

        let mut probs = logits;
        let mut total = 0.0f32;
        for (mut row, &label) in probs.outer_iter_mut().zip(shard.labels) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            total -= (row[label] / sum).ln();
            row.mapv_inplace(|v| v / sum);
        }
        let loss = total / shard.size() as f32;

        if !loss.is_finite() {
            return Err(Error::Execution(format!(
                "loss is not finite ({loss}); the learning rate has probably diverged the model"
            )));
        }

        Ok(Forward {
            pooled,
            hidden_pre,
            hidden,
            probs,
            loss,
        })
    }
}

/// Per-segment mean and standard deviation over frames `[batch, 2 * dim]`
fn stats_pool(features: ArrayView3<'_, f32>) -> Array2<f32> {
    let (segments, _, dim) = features.dim();
    let mut pooled = Array2::zeros((segments, 2 * dim));
    for (i, segment) in features.outer_iter().enumerate() {
        let mean = segment
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(dim));
        let std = segment
            .var_axis(Axis(0), 0.0)
            .mapv(|v| (v + VAR_FLOOR).sqrt());
        pooled.slice_mut(s![i, ..dim]).assign(&mean);
        pooled.slice_mut(s![i, dim..]).assign(&std);
    }
    pooled
}

fn xavier(rng: &mut dyn RngCore, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    Array2::from_shape_simple_fn((fan_in, fan_out), || rng.random_range(-limit..limit))
}

impl SpeakerModel for StatsPoolingClassifier {
    fn name(&self) -> &str {
        "stats-pooling-classifier"
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn init_params(&self, rng: &mut dyn RngCore) -> ParamSet {
        let pooled_dim = 2 * self.input_dim;
        ParamSet::new()
            .with(EMBEDDING_WEIGHTS, xavier(rng, pooled_dim, self.embedding_dim))
            .with(EMBEDDING_BIAS, Array2::zeros((1, self.embedding_dim)))
            .with(OUTPUT_WEIGHTS, xavier(rng, self.embedding_dim, self.num_classes))
            .with(OUTPUT_BIAS, Array2::zeros((1, self.num_classes)))
    }

    fn forward_backward(&self, params: &ParamSet, shard: &Shard<'_>) -> Result<StepOutput> {
        let fwd = self.forward(params, shard)?;
        let [_, _, w2, _] = self.unpack(params)?;
        let n = shard.size() as f32;

        // d loss / d logits = (softmax - onehot) / n
        let mut d_logits = fwd.probs;
        for (mut row, &label) in d_logits.outer_iter_mut().zip(shard.labels) {
            row[label] -= 1.0;
        }
        d_logits.mapv_inplace(|v| v / n);

        let d_w2 = fwd.hidden.t().dot(&d_logits);
        let d_b2 = d_logits.sum_axis(Axis(0)).insert_axis(Axis(0));

        let mut d_hidden = d_logits.dot(&w2.t());
        Zip::from(&mut d_hidden)
            .and(&fwd.hidden_pre)
            .for_each(|g, &pre| {
                if pre <= 0.0 {
                    *g = 0.0;
                }
            });

        let d_w1 = fwd.pooled.t().dot(&d_hidden);
        let d_b1 = d_hidden.sum_axis(Axis(0)).insert_axis(Axis(0));

        let grads = ParamSet::new()
            .with(EMBEDDING_WEIGHTS, d_w1)
            .with(EMBEDDING_BIAS, d_b1)
            .with(OUTPUT_WEIGHTS, d_w2)
            .with(OUTPUT_BIAS, d_b2);

        if !grads.is_finite() {
            return Err(Error::Execution(
                "gradient contains NaN or infinite values".into(),
            ));
        }

        Ok(StepOutput {
            loss: fwd.loss,
            grads,
        })
    }

    fn loss(&self, params: &ParamSet, shard: &Shard<'_>) -> Result<f32> {
        self.forward(params, shard).map(|f| f.loss)
    }
}
