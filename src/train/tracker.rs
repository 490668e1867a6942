//! Best validation loss tracker
//!
//! Persists the best loss seen so far so repeated or resumed runs against
//! one model directory keep comparing against the true historical best.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Best loss seen so far and the epoch that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct LossTracker {
    best_loss: f32,
    best_epoch: Option<usize>,
    updated_at: Option<DateTime<Utc>>,
}

/// On-disk form; an infinite loss is stored as an absent value
#[derive(Debug, Serialize, Deserialize)]
struct TrackerRecord {
    #[serde(default)]
    best_loss: Option<f32>,
    #[serde(default)]
    best_epoch: Option<usize>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl Default for LossTracker {
    fn default() -> Self {
        Self {
            best_loss: f32::INFINITY,
            best_epoch: None,
            updated_at: None,
        }
    }
}

impl LossTracker {
    /// Fresh tracker with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Best loss, `+inf` without history
    pub fn best_loss(&self) -> f32 {
        self.best_loss
    }

    /// Epoch of the best loss
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Time of the last improvement
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Record a candidate loss
    ///
    /// Returns true and overwrites the record only when `loss` is strictly
    /// lower than the best so far. Non-finite losses never improve, so the
    /// stored best is always finite or the `+inf` of an empty history.
    pub fn update(&mut self, loss: f32, epoch: usize) -> bool {
        if loss.is_finite() && loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = Some(epoch);
            self.updated_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Load a saved tracker, or a fresh one when the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading loss tracker {}", path.display()), e))?;
        let record: TrackerRecord = serde_json::from_str(&content)?;
        Ok(Self {
            best_loss: record
                .best_loss
                .filter(|l| !l.is_nan())
                .unwrap_or(f32::INFINITY),
            best_epoch: record.best_epoch,
            updated_at: record.updated_at,
        })
    }

    /// Write the tracker atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let record = TrackerRecord {
            best_loss: self.best_loss.is_finite().then_some(self.best_loss),
            best_epoch: self.best_epoch,
            updated_at: self.updated_at,
        };
        let json = serde_json::to_string_pretty(&record)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)
            .map_err(|e| Error::io(format!("writing loss tracker {}", path.display()), e))?;
        fs::rename(&tmp, path)
            .map_err(|e| Error::io(format!("replacing loss tracker {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_improvement() {
        let mut tracker = LossTracker::new();
        assert!(tracker.update(2.0, 0));
        assert!(tracker.update(1.5, 1));
        assert!(!tracker.update(1.5, 2));
        assert!(!tracker.update(3.0, 3));
        assert_eq!(tracker.best_loss(), 1.5);
        assert_eq!(tracker.best_epoch(), Some(1));
    }

    #[test]
    fn test_nan_is_not_an_improvement() {
        let mut tracker = LossTracker::new();
        assert!(!tracker.update(f32::NAN, 0));
        assert!(tracker.best_loss().is_infinite());
        assert!(tracker.best_epoch().is_none());
    }

    #[test]
    fn test_infinite_loss_is_not_an_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid_loss");
        let mut tracker = LossTracker::new();
        assert!(tracker.update(0.5, 0));
        assert!(!tracker.update(f32::NEG_INFINITY, 1));
        assert_eq!(tracker.best_loss(), 0.5);
        assert_eq!(tracker.best_epoch(), Some(0));

        tracker.save(&path).unwrap();
        assert_eq!(LossTracker::load(&path).unwrap(), tracker);
    }

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = LossTracker::load(dir.path().join("valid_loss")).unwrap();
        assert_eq!(tracker, LossTracker::default());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid_loss");
        let mut tracker = LossTracker::new();
        tracker.update(0.75, 4);
        tracker.save(&path).unwrap();

        let loaded = LossTracker::load(&path).unwrap();
        assert_eq!(loaded, tracker);
        assert!(!dir.path().join("valid_loss.tmp").exists());
    }

    #[test]
    fn test_empty_history_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid_loss");
        LossTracker::new().save(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"best_loss\": null"));
        assert!(LossTracker::load(&path).unwrap().best_loss().is_infinite());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid_loss");
        std::fs::write(&path, "not json").unwrap();
        assert!(LossTracker::load(&path).is_err());
    }
}
