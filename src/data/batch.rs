//! Batch data structure

use crate::error::{Error, Result};
use ndarray::{s, Array3, ArrayView3, Axis};

/// A class-balanced training batch
///
/// Segments are grouped by speaker: `num_segments_per_speaker` consecutive
/// entries share one label. All segments share one frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// Segment features `[batch, frames, dim]`
    pub features: Array3<f32>,
    /// Speaker class index of every segment
    pub labels: Vec<usize>,
}

/// Borrowed slice of a batch assigned to one device
#[derive(Clone, Copy, Debug)]
pub struct Shard<'a> {
    /// Segment features `[shard, frames, dim]`
    pub features: ArrayView3<'a, f32>,
    /// Speaker class index of every segment
    pub labels: &'a [usize],
}

impl Batch {
    /// Create a new batch
    pub fn new(features: Array3<f32>, labels: Vec<usize>) -> Result<Self> {
        if features.len_of(Axis(0)) != labels.len() {
            return Err(Error::Data(format!(
                "batch holds {} segments but {} labels",
                features.len_of(Axis(0)),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Number of segments
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Frames per segment
    pub fn segment_len(&self) -> usize {
        self.features.len_of(Axis(1))
    }

    /// Feature dimension
    pub fn dim(&self) -> usize {
        self.features.len_of(Axis(2))
    }

    /// Distinct speaker indices in order of first appearance
    pub fn speaker_set(&self) -> Vec<usize> {
        let mut seen = Vec::new();
        for &label in &self.labels {
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        seen
    }

    /// View the whole batch as a single shard
    pub fn as_shard(&self) -> Shard<'_> {
        Shard {
            features: self.features.view(),
            labels: &self.labels,
        }
    }

    /// Split into `n` equal contiguous shards
    pub fn shards(&self, n: usize) -> Result<Vec<Shard<'_>>> {
        if n == 0 || self.size() % n != 0 {
            return Err(Error::IndivisibleBatch {
                batch_size: self.size(),
                num_devices: n,
            });
        }
        let shard_size = self.size() / n;
        Ok((0..n)
            .map(|i| {
                let range = i * shard_size..(i + 1) * shard_size;
                Shard {
                    features: self.features.slice(s![range.clone(), .., ..]),
                    labels: &self.labels[range],
                }
            })
            .collect())
    }
}

impl Shard<'_> {
    /// Number of segments in the shard
    pub fn size(&self) -> usize {
        self.labels.len()
    }
}
