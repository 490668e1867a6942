//! Feature sources: per-speaker access to utterance feature matrices
//!
//! A feature matrix is `[frames, dim]`. Sources are read-only and shared by
//! all sampler workers, hence `Send + Sync`.

use crate::error::{Error, Result};
use ndarray::{s, Array2};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Boxed lazy sequence of feature matrices
pub type Utterances<'a> = Box<dyn Iterator<Item = Result<Array2<f32>>> + 'a>;

/// Read access to a speaker-organized corpus
pub trait FeatureSource: Send + Sync {
    /// Feature dimension, constant for the corpus
    fn dimension(&self) -> usize;

    /// Number of utterances owned by a speaker
    fn utterance_count(&self, speaker: &str) -> Result<usize>;

    /// Load one utterance of a speaker by position
    fn load_utterance(&self, speaker: &str, index: usize) -> Result<Array2<f32>>;

    /// Lazily iterate over every utterance of a speaker
    ///
    /// Fails with [`Error::MissingSpeaker`] when the speaker is unknown.
    fn utterances_for<'a>(&'a self, speaker: &str) -> Result<Utterances<'a>> {
        let count = self.utterance_count(speaker)?;
        let speaker = speaker.to_string();
        Ok(Box::new(
            (0..count).map(move |i| self.load_utterance(&speaker, i)),
        ))
    }
}

impl<F: FeatureSource + ?Sized> FeatureSource for std::sync::Arc<F> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn utterance_count(&self, speaker: &str) -> Result<usize> {
        (**self).utterance_count(speaker)
    }

    fn load_utterance(&self, speaker: &str, index: usize) -> Result<Array2<f32>> {
        (**self).load_utterance(speaker, index)
    }
}

fn missing(speaker: &str) -> Error {
    Error::MissingSpeaker {
        speaker: speaker.to_string(),
    }
}

/// Kaldi-style data directory with `.npy` feature matrices
///
/// Layout:
/// - `spk2utt`: `<speaker> <utt> [<utt> ...]` per line
/// - `feats.scp`: `<utt> <path.npy>` per line, relative paths resolved
///   against the directory
#[derive(Debug, Clone)]
pub struct KaldiCorpus {
    dir: PathBuf,
    spk2utt: HashMap<String, Vec<String>>,
    feats: HashMap<String, PathBuf>,
    dim: usize,
}

impl KaldiCorpus {
    /// Open a data directory and discover its feature dimension
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let spk2utt_text = read_listing(&dir.join("spk2utt"))?;
        let feats_text = read_listing(&dir.join("feats.scp"))?;

        let mut feats = HashMap::new();
        for line in feats_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((utt, path)) = line.split_once(char::is_whitespace) else {
                return Err(Error::Data(format!(
                    "feats.scp in {}: malformed line '{line}'",
                    dir.display()
                )));
            };
            let path = PathBuf::from(path.trim());
            let path = if path.is_relative() { dir.join(path) } else { path };
            feats.insert(utt.to_string(), path);
        }

        let mut spk2utt = HashMap::new();
        let mut first_utt = None;
        for line in spk2utt_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut fields = line.split_whitespace();
            let Some(speaker) = fields.next() else { continue };
            let utts: Vec<String> = fields.map(str::to_string).collect();
            for utt in &utts {
                if !feats.contains_key(utt) {
                    return Err(Error::Data(format!(
                        "utterance '{utt}' of speaker '{speaker}' has no entry in feats.scp"
                    )));
                }
            }
            if first_utt.is_none() {
                first_utt = utts.first().cloned();
            }
            spk2utt.insert(speaker.to_string(), utts);
        }

        let first_utt = first_utt.ok_or_else(|| {
            Error::Data(format!("corpus {} contains no utterances", dir.display()))
        })?;
        let first: Array2<f32> = ndarray_npy::read_npy(&feats[&first_utt])?;
        let dim = first.ncols();
        if dim == 0 {
            return Err(Error::Data(format!(
                "utterance '{first_utt}' has zero-width features"
            )));
        }

        Ok(Self {
            dir,
            spk2utt,
            feats,
            dim,
        })
    }

    /// Data directory this corpus was opened from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Speakers present in `spk2utt`
    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.spk2utt.keys().map(String::as_str)
    }

    /// Utterance identifiers of a speaker
    pub fn utterance_ids(&self, speaker: &str) -> Result<&[String]> {
        self.spk2utt
            .get(speaker)
            .map(Vec::as_slice)
            .ok_or_else(|| missing(speaker))
    }
}

fn read_listing(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))
}

impl FeatureSource for KaldiCorpus {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn utterance_count(&self, speaker: &str) -> Result<usize> {
        Ok(self.utterance_ids(speaker)?.len())
    }

    fn load_utterance(&self, speaker: &str, index: usize) -> Result<Array2<f32>> {
        let utts = self.utterance_ids(speaker)?;
        let utt = utts.get(index).ok_or_else(|| {
            Error::Data(format!(
                "speaker '{speaker}' has {} utterances, index {index} requested",
                utts.len()
            ))
        })?;
        let features: Array2<f32> = ndarray_npy::read_npy(&self.feats[utt])?;
        if features.ncols() != self.dim || features.nrows() == 0 {
            return Err(Error::Data(format!(
                "utterance '{utt}' has shape {:?}, expected [frames > 0, {}]",
                features.shape(),
                self.dim
            )));
        }
        Ok(features)
    }
}

/// Corpus held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    dim: usize,
    utterances: HashMap<String, Vec<Array2<f32>>>,
}

impl InMemoryCorpus {
    /// Create an empty corpus of the given feature dimension
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            utterances: HashMap::new(),
        }
    }

    /// Add utterances for a speaker
    pub fn insert(&mut self, speaker: impl Into<String>, utts: Vec<Array2<f32>>) -> Result<()> {
        let speaker = speaker.into();
        if let Some(bad) = utts.iter().find(|u| u.ncols() != self.dim || u.nrows() == 0) {
            return Err(Error::Data(format!(
                "utterance of '{speaker}' has shape {:?}, expected [frames > 0, {}]",
                bad.shape(),
                self.dim
            )));
        }
        self.utterances.entry(speaker).or_default().extend(utts);
        Ok(())
    }
}

impl FeatureSource for InMemoryCorpus {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn utterance_count(&self, speaker: &str) -> Result<usize> {
        self.utterances
            .get(speaker)
            .map(Vec::len)
            .ok_or_else(|| missing(speaker))
    }

    fn load_utterance(&self, speaker: &str, index: usize) -> Result<Array2<f32>> {
        let utts = self.utterances.get(speaker).ok_or_else(|| missing(speaker))?;
        utts.get(index).cloned().ok_or_else(|| {
            Error::Data(format!(
                "speaker '{speaker}' has {} utterances, index {index} requested",
                utts.len()
            ))
        })
    }
}

/// Keeps only the leading `dim` feature columns of an inner source
///
/// Used when `selected_dim` overrides the corpus dimension.
#[derive(Debug, Clone)]
pub struct SelectedDim<F> {
    inner: F,
    dim: usize,
}

impl<F: FeatureSource> SelectedDim<F> {
    /// Wrap a source; `dim` must be in `1..=inner.dimension()`
    pub fn new(inner: F, dim: usize) -> Result<Self> {
        if dim == 0 || dim > inner.dimension() {
            return Err(Error::config(
                "selected_dim",
                format!(
                    "{dim} is outside 1..={} (the corpus feature dimension)",
                    inner.dimension()
                ),
            ));
        }
        Ok(Self { inner, dim })
    }
}

impl<F: FeatureSource> FeatureSource for SelectedDim<F> {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn utterance_count(&self, speaker: &str) -> Result<usize> {
        self.inner.utterance_count(speaker)
    }

    fn load_utterance(&self, speaker: &str, index: usize) -> Result<Array2<f32>> {
        let full = self.inner.load_utterance(speaker, index)?;
        Ok(full.slice(s![.., ..self.dim]).to_owned())
    }
}
