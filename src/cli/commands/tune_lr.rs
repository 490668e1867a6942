//! tune-lr command implementation

use crate::config::{apply_overrides, load_params, TuneLrArgs};
use crate::error::Result;
use crate::train::{run_sweep, DataSet, StopFlag, SweepRequest};

/// Build the sweep request from parsed arguments
pub(crate) fn sweep_request(args: &TuneLrArgs, stop: StopFlag) -> Result<SweepRequest> {
    let mut params = load_params(&args.config)?;
    apply_overrides(&mut params, args);
    Ok(SweepRequest {
        params,
        train: DataSet::new(&args.train_dir, &args.train_spklist),
        valid: Some(DataSet::new(&args.valid_dir, &args.valid_spklist)),
        model_dir: args.model.clone(),
        num_devices: args.num_gpus,
        tune_period: args.tune_period,
        stop,
    })
}

pub fn run_tune_lr(args: TuneLrArgs) -> Result<()> {
    tracing::info!(config = %args.config.display(), "tuning the learning rate");

    let stop = StopFlag::new();
    let request = sweep_request(&args, stop.clone())?;

    let handler_flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, stopping after the current step");
        handler_flag.trigger();
    }) {
        tracing::warn!(error = %e, "could not install the interrupt handler");
    }

    let report = run_sweep(&request)?;
    tracing::info!(
        steps = report.steps_run,
        final_step = report.final_step(),
        last_lr = ?report.last_lr,
        best_valid_loss = ?report.best_valid_loss,
        elapsed_secs = report.elapsed_secs,
        "sweep finished: {}",
        report.stop_reason
    );
    Ok(())
}
