//! Loading and snapshotting sweep configuration files

use super::schema::TrainParams;
use super::validate::validate_params;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// File name of the resolved configuration snapshot inside the model directory
pub const CONFIG_SNAPSHOT: &str = "config.yaml";

/// Load and validate sweep parameters from a YAML file
///
/// # Example
///
/// ```no_run
/// use spktrain::config::load_params;
///
/// let params = load_params("conf/xvector.yaml")?;
/// println!("batch size: {}", params.batch_size());
/// # Ok::<(), spktrain::Error>(())
/// ```
pub fn load_params<P: AsRef<Path>>(config_path: P) -> Result<TrainParams> {
    let path = config_path.as_ref();
    if !path.exists() {
        return Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }

    let yaml_content = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading config file {}", path.display()), e))?;

    let params: TrainParams =
        serde_yaml::from_str(&yaml_content).map_err(|e| Error::ConfigParsing {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    validate_params(&params)?;

    Ok(params)
}

/// Write the resolved parameters into the model directory
///
/// Downstream tools read this snapshot instead of the original config file so
/// command-line overrides are captured too.
pub fn save_params_snapshot(params: &TrainParams, model_dir: &Path) -> Result<()> {
    fs::create_dir_all(model_dir)
        .map_err(|e| Error::io(format!("creating {}", model_dir.display()), e))?;
    let yaml = serde_yaml::to_string(params).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })?;
    let path = model_dir.join(CONFIG_SNAPSHOT);
    fs::write(&path, yaml).map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Placement;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "seed: 3\nnum_speakers_per_batch: 4\nnum_segments_per_speaker: 2\nps: cpu"
        )
        .unwrap();

        let params = load_params(file.path()).unwrap();
        assert_eq!(params.seed, 3);
        assert_eq!(params.ps, Placement::Cpu);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_params("/nonexistent/sweep.yaml").unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_missing_required_option() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "seed: 3\nnum_segments_per_speaker: 2").unwrap();

        let err = load_params(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParsing { .. }));
        assert!(err.to_string().contains("num_speakers_per_batch"));
    }

    #[test]
    fn test_load_invalid_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "seed: 3\nnum_speakers_per_batch: 4\nnum_segments_per_speaker: 2\nqueue_capacity: 0"
        )
        .unwrap();

        let err = load_params(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { ref field, .. } if field == "queue_capacity"));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let params = TrainParams::new(11, 8, 1);
        save_params_snapshot(&params, dir.path()).unwrap();

        let loaded = load_params(dir.path().join(CONFIG_SNAPSHOT)).unwrap();
        assert_eq!(loaded, params);
    }
}
