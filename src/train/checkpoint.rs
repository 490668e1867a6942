//! Checkpoints for exact resume
//!
//! Each checkpoint is a directory `model-<step>` holding one `.npy` file per
//! parameter and optimizer slot plus a `manifest.json` with the training
//! state. A text file `checkpoint` names the latest complete directory; it
//! is replaced only after the directory is fully written.

use crate::error::{Error, Result};
use crate::model::ParamSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const LATEST_FILE: &str = "checkpoint";
const MANIFEST_FILE: &str = "manifest.json";
const PARAM_PREFIX: &str = "param-";
const SLOT_PREFIX: &str = "slot-";
const DIR_PREFIX: &str = "model-";

/// Progress of a sweep, persisted with every checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Steps completed so far
    pub global_step: usize,
    /// Completed tune periods
    pub epoch: usize,
    /// Rate used by the last step
    pub learning_rate: f32,
    /// Best validation loss of this run
    #[serde(default)]
    pub best_valid_loss: Option<f32>,
    /// Step at which the best validation loss was measured
    #[serde(default)]
    pub best_step: Option<usize>,
}

/// Everything needed to continue a run
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub state: TrainingState,
    pub params: ParamSet,
    pub slots: Option<ParamSet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    state: TrainingState,
    params: Vec<String>,
    #[serde(default)]
    slots: Vec<String>,
    written_at: DateTime<Utc>,
}

/// Writes and finds checkpoints in one directory
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
    keep: usize,
}

impl Checkpointer {
    /// Checkpoints under `dir`, keeping the three most recent
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keep: 3,
        }
    }

    /// Number of checkpoints retained after each save (at least one)
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    /// Directory holding the checkpoints
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a checkpoint and mark it as the latest
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let name = format!("{DIR_PREFIX}{}", checkpoint.state.global_step);
        let target = self.dir.join(&name);
        let staging = self.dir.join(format!(".{name}.tmp"));

        let io = |what: &str, path: &Path, e| Error::io(format!("{what} {}", path.display()), e);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| io("removing stale", &staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| io("creating", &staging, e))?;

        checkpoint.params.save_npy(&staging, PARAM_PREFIX)?;
        if let Some(slots) = &checkpoint.slots {
            slots.save_npy(&staging, SLOT_PREFIX)?;
        }
        let manifest = Manifest {
            state: checkpoint.state.clone(),
            params: checkpoint.params.names().map(String::from).collect(),
            slots: checkpoint
                .slots
                .iter()
                .flat_map(|s| s.names().map(String::from))
                .collect(),
            written_at: Utc::now(),
        };
        let manifest_path = staging.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .map_err(|e| io("writing", &manifest_path, e))?;

        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| io("replacing", &target, e))?;
        }
        fs::rename(&staging, &target).map_err(|e| io("publishing", &target, e))?;

        let latest = self.dir.join(LATEST_FILE);
        let latest_tmp = self.dir.join(format!("{LATEST_FILE}.tmp"));
        fs::write(&latest_tmp, format!("{name}\n")).map_err(|e| io("writing", &latest_tmp, e))?;
        fs::rename(&latest_tmp, &latest).map_err(|e| io("replacing", &latest, e))?;

        self.prune()?;
        tracing::debug!(path = %target.display(), "checkpoint written");
        Ok(target)
    }

    /// Path of the latest complete checkpoint, if any
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        let latest = self.dir.join(LATEST_FILE);
        if !latest.exists() {
            return Ok(None);
        }
        let name = fs::read_to_string(&latest)
            .map_err(|e| Error::io(format!("reading {}", latest.display()), e))?;
        let path = self.dir.join(name.trim());
        if !path.join(MANIFEST_FILE).exists() {
            return Err(Error::Data(format!(
                "{} points at {} which is not a complete checkpoint",
                latest.display(),
                path.display()
            )));
        }
        Ok(Some(path))
    }

    /// Load the latest checkpoint, if any
    pub fn load_latest(&self) -> Result<Option<Checkpoint>> {
        self.latest()?.map(|path| Self::load(&path)).transpose()
    }

    /// Load a checkpoint directory
    pub fn load(path: &Path) -> Result<Checkpoint> {
        let manifest_path = path.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path)
            .map_err(|e| Error::io(format!("reading {}", manifest_path.display()), e))?;
        let manifest: Manifest = serde_json::from_str(&raw)?;

        let params = ParamSet::load_npy(path, PARAM_PREFIX, &manifest.params)?;
        let slots = if manifest.slots.is_empty() {
            None
        } else {
            Some(ParamSet::load_npy(path, SLOT_PREFIX, &manifest.slots)?)
        };
        Ok(Checkpoint {
            state: manifest.state,
            params,
            slots,
        })
    }

    fn prune(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::io(format!("listing {}", self.dir.display()), e))?;
        let mut steps: Vec<(usize, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let step = name.strip_prefix(DIR_PREFIX)?.parse().ok()?;
                Some((step, entry.path()))
            })
            .collect();
        steps.sort_by_key(|(step, _)| *step);

        let excess = steps.len().saturating_sub(self.keep);
        for (_, path) in steps.into_iter().take(excess) {
            fs::remove_dir_all(&path)
                .map_err(|e| Error::io(format!("removing old checkpoint {}", path.display()), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn checkpoint(step: usize, with_slots: bool) -> Checkpoint {
        let params = ParamSet::new()
            .with("w", array![[1.0, 2.0], [3.0, 4.0]])
            .with("b", array![[0.5]]);
        let slots = with_slots.then(|| params.zeros_like());
        Checkpoint {
            state: TrainingState {
                global_step: step,
                epoch: step / 10,
                learning_rate: 0.01,
                best_valid_loss: Some(1.25),
                best_step: Some(step),
            },
            params,
            slots,
        }
    }

    #[test]
    fn test_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        assert!(ckpt.latest().unwrap().is_none());
        assert!(ckpt.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        ckpt.save(&checkpoint(10, true)).unwrap();
        let second = checkpoint(20, true);
        let path = ckpt.save(&second).unwrap();

        assert_eq!(ckpt.latest().unwrap(), Some(path));
        assert_eq!(ckpt.load_latest().unwrap(), Some(second));
    }

    #[test]
    fn test_checkpoint_without_slots() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        ckpt.save(&checkpoint(5, false)).unwrap();
        assert!(ckpt.load_latest().unwrap().unwrap().slots.is_none());
    }

    #[test]
    fn test_old_checkpoints_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path()).with_keep(2);
        for step in [100, 200, 300, 400] {
            ckpt.save(&checkpoint(step, false)).unwrap();
        }
        assert!(!dir.path().join("model-100").exists());
        assert!(!dir.path().join("model-200").exists());
        assert!(dir.path().join("model-300").exists());
        assert!(dir.path().join("model-400").exists());
    }

    #[test]
    fn test_dangling_pointer_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LATEST_FILE), "model-7\n").unwrap();
        let err = Checkpointer::new(dir.path()).latest().unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }
}
