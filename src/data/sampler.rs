//! Class-balanced random batch sampling
//!
//! Every batch holds `num_speakers_per_batch` distinct speakers with exactly
//! `num_segments_per_speaker` segments each. Batch `k` is drawn from a
//! generator seeded by `(seed, k)` alone, so the sequence of sampled speaker
//! sets is reproducible and can be resumed at any batch index.

use super::batch::Batch;
use super::corpus::FeatureSource;
use super::spklist::SpeakerIndex;
use crate::config::TrainParams;
use crate::error::{Error, Result};
use ndarray::{s, Array2, Array3, ArrayViewMut2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

const BATCH_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Distinct speakers per batch
    pub num_speakers_per_batch: usize,
    /// Segments per sampled speaker
    pub num_segments_per_speaker: usize,
    /// Shortest segment in frames
    pub min_segment_len: usize,
    /// Longest segment in frames
    pub max_segment_len: usize,
    /// Base seed of the batch sequence
    pub seed: u64,
}

impl SamplerConfig {
    /// Segments per batch
    pub fn batch_size(&self) -> usize {
        self.num_speakers_per_batch * self.num_segments_per_speaker
    }
}

impl From<&TrainParams> for SamplerConfig {
    fn from(params: &TrainParams) -> Self {
        Self {
            num_speakers_per_batch: params.num_speakers_per_batch,
            num_segments_per_speaker: params.num_segments_per_speaker,
            min_segment_len: params.min_segment_len,
            max_segment_len: params.max_segment_len,
            seed: params.seed,
        }
    }
}

/// Generator for batch `batch_index` of the sequence rooted at `seed`
pub fn batch_rng(seed: u64, batch_index: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ batch_index.wrapping_mul(BATCH_SEED_STRIDE))
}

/// Draws class-balanced batches from a feature source
#[derive(Debug)]
pub struct BatchSampler<F> {
    source: F,
    speakers: SpeakerIndex,
    config: SamplerConfig,
}

impl<F: FeatureSource> BatchSampler<F> {
    /// Create a sampler
    ///
    /// Fails with a configuration error when a batch would need more
    /// speakers than the speaker list holds.
    pub fn new(source: F, speakers: SpeakerIndex, config: SamplerConfig) -> Result<Self> {
        if config.num_speakers_per_batch == 0 || config.num_segments_per_speaker == 0 {
            return Err(Error::config(
                "num_speakers_per_batch",
                "batches need at least one speaker and one segment per speaker",
            ));
        }
        if config.num_speakers_per_batch > speakers.len() {
            return Err(Error::config(
                "num_speakers_per_batch",
                format!(
                    "{} speakers per batch requested but the speaker list holds only {}",
                    config.num_speakers_per_batch,
                    speakers.len()
                ),
            ));
        }
        if config.min_segment_len == 0 || config.min_segment_len > config.max_segment_len {
            return Err(Error::config(
                "min_segment_len",
                format!(
                    "segment range [{}, {}] is empty",
                    config.min_segment_len, config.max_segment_len
                ),
            ));
        }
        Ok(Self {
            source,
            speakers,
            config,
        })
    }

    /// Sampling parameters
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Speaker list batches are labeled with
    pub fn speakers(&self) -> &SpeakerIndex {
        &self.speakers
    }

    /// Feature dimension of produced batches
    pub fn dimension(&self) -> usize {
        self.source.dimension()
    }

    /// Sample batch `batch_index` of the seeded sequence
    pub fn sample(&self, batch_index: u64) -> Result<Batch> {
        let mut rng = batch_rng(self.config.seed, batch_index);
        self.sample_with(&mut rng)
    }

    /// Sample one batch from an explicit generator
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Batch> {
        let num_speakers = self.config.num_speakers_per_batch;
        let num_segments = self.config.num_segments_per_speaker;
        let segment_len = rng.random_range(self.config.min_segment_len..=self.config.max_segment_len);
        let dim = self.source.dimension();

        let mut features = Array3::zeros((self.config.batch_size(), segment_len, dim));
        let mut labels = Vec::with_capacity(self.config.batch_size());

        let chosen = index::sample(rng, self.speakers.len(), num_speakers);
        for (slot, label) in chosen.iter().enumerate() {
            let speaker = self.speakers.speaker(label).ok_or_else(|| {
                Error::Data(format!("speaker index {label} has no speaker name"))
            })?;
            let available = self.source.utterance_count(speaker)?;
            if available < num_segments {
                return Err(Error::InsufficientUtterances {
                    speaker: speaker.to_string(),
                    available,
                    required: num_segments,
                });
            }

            let utts = index::sample(rng, available, num_segments);
            for (j, utt) in utts.iter().enumerate() {
                let matrix = self.source.load_utterance(speaker, utt)?;
                let row = slot * num_segments + j;
                crop_segment(&matrix, rng, features.index_axis_mut(Axis(0), row));
                labels.push(label);
            }
        }

        Batch::new(features, labels)
    }
}

/// Copy a random window of `out.nrows()` frames from `matrix` into `out`
///
/// Utterances shorter than the window are repeated cyclically.
fn crop_segment<R: Rng + ?Sized>(matrix: &Array2<f32>, rng: &mut R, mut out: ArrayViewMut2<'_, f32>) {
    let frames = matrix.nrows();
    let len = out.nrows();
    if frames >= len {
        let start = rng.random_range(0..=frames - len);
        out.assign(&matrix.slice(s![start..start + len, ..]));
    } else {
        for (t, mut row) in out.outer_iter_mut().enumerate() {
            row.assign(&matrix.row(t % frames));
        }
    }
}
