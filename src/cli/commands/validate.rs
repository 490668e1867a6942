//! Validate command implementation

use crate::config::{load_params, TrainParams, ValidateArgs};
use crate::error::Result;
use crate::train::check_device_split;

/// Format the sweep settings as a string
pub fn format_sweep_info(params: &TrainParams) -> String {
    let sweep = &params.lr_sweep;
    let mut lines = vec![
        format!(
            "  Batch: {} speakers x {} segments = {}",
            params.num_speakers_per_batch,
            params.num_segments_per_speaker,
            params.batch_size()
        ),
        format!(
            "  Segment length: {}..={} frames",
            params.min_segment_len, params.max_segment_len
        ),
        format!("  Sweep policy: {:?}", sweep.policy),
        format!("  Learning rate: {:e} up to {:e}", sweep.start_lr, sweep.max_lr),
    ];
    if let Some(max_steps) = sweep.max_steps {
        lines.push(format!("  Step budget: {max_steps}"));
    }
    if let Some(clip) = params.clip_gradient_norm {
        lines.push(format!("  Gradient clipping: {clip}"));
    }
    lines.join("\n")
}

pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let params = load_params(&args.config)?;
    check_device_split(params.batch_size(), args.num_gpus)?;

    tracing::info!(
        config = %args.config.display(),
        devices = args.num_gpus,
        "configuration is valid"
    );
    tracing::debug!("\n{}", format_sweep_info(&params));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use std::path::Path;

    fn write_config(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("sweep.yaml");
        fs::write(
            &path,
            "seed: 1\nnum_speakers_per_batch: 4\nnum_segments_per_speaker: 2\nclip_gradient_norm: 3.0\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_valid_config_and_split() {
        let dir = tempfile::tempdir().unwrap();
        let args = ValidateArgs {
            config: write_config(dir.path()),
            num_gpus: 4,
        };
        assert!(run_validate(args).is_ok());
    }

    #[test]
    fn test_indivisible_split_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = ValidateArgs {
            config: write_config(dir.path()),
            num_gpus: 3,
        };
        assert!(matches!(
            run_validate(args),
            Err(Error::IndivisibleBatch {
                batch_size: 8,
                num_devices: 3
            })
        ));
    }

    #[test]
    fn test_format_sweep_info() {
        let mut params = TrainParams::new(0, 4, 2);
        params.clip_gradient_norm = Some(3.0);
        let info = format_sweep_info(&params);
        assert!(info.contains("= 8"));
        assert!(info.contains("Geometric"));
        assert!(info.contains("Gradient clipping: 3"));
    }
}
