//! Speaker list: speaker identity to dense class index

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Immutable mapping from speaker identity to a contiguous index `0..n`
///
/// Built once when the corpus is loaded. Its length is the number of output
/// classes of the classification head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerIndex {
    index: HashMap<String, usize>,
    /// Speaker names ordered by index
    names: Vec<String>,
}

impl SpeakerIndex {
    /// Build an index from `(speaker, index)` pairs
    ///
    /// Indices must cover `0..n` exactly once; duplicated speakers,
    /// duplicated indices and gaps are data errors.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let pairs: Vec<(String, usize)> = pairs.into_iter().map(|(s, i)| (s.into(), i)).collect();
        let n = pairs.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        let mut index = HashMap::with_capacity(n);

        for (speaker, idx) in pairs {
            if idx >= n {
                return Err(Error::Data(format!(
                    "speaker '{speaker}' has index {idx} but the list only holds {n} speakers; indices must be contiguous from 0"
                )));
            }
            if let Some(existing) = &slots[idx] {
                return Err(Error::Data(format!(
                    "index {idx} is assigned to both '{existing}' and '{speaker}'"
                )));
            }
            if index.insert(speaker.clone(), idx).is_some() {
                return Err(Error::Data(format!("speaker '{speaker}' is listed twice")));
            }
            slots[idx] = Some(speaker);
        }

        // every slot is filled: n distinct indices below n
        let names = slots.into_iter().flatten().collect();
        Ok(Self { index, names })
    }

    /// Parse the `<speaker> <index>` text format
    pub fn parse(content: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(speaker), Some(idx), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::Data(format!(
                    "speaker list line {}: expected '<speaker> <index>', got '{line}'",
                    lineno + 1
                )));
            };
            let idx: usize = idx.parse().map_err(|_| {
                Error::Data(format!(
                    "speaker list line {}: '{idx}' is not a valid index",
                    lineno + 1
                ))
            })?;
            pairs.push((speaker.to_string(), idx));
        }
        Self::from_pairs(pairs)
    }

    /// Load a speaker list file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading speaker list {}", path.display()), e))?;
        Self::parse(&content)
    }

    /// Number of total speakers
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the list holds no speakers
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Class index of a speaker
    pub fn index_of(&self, speaker: &str) -> Result<usize> {
        self.index
            .get(speaker)
            .copied()
            .ok_or_else(|| Error::MissingSpeaker {
                speaker: speaker.to_string(),
            })
    }

    /// Speaker identity at a class index
    pub fn speaker(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Speakers ordered by index
    pub fn speakers(&self) -> &[String] {
        &self.names
    }
}
