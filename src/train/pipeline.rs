//! End-to-end sweep: corpus loading, trainer setup, resume and teardown
//!
//! Model directory layout:
//! - `config.yaml`: resolved parameters
//! - `learning_rate_tuning`: the step trace
//! - `nnet/feature_dim`: feature dimension of the model input
//! - `nnet/valid_loss`: best validation loss tracker
//! - `nnet/checkpoint`, `nnet/model-<step>/`: checkpoints

use super::checkpoint::{Checkpointer, TrainingState};
use super::sweep::{StopFlag, SweepController, SweepReport};
use super::trace::{LrTrace, TRACE_FILE};
use super::tracker::LossTracker;
use super::trainer::{build_trainer, check_device_split, Stage, Trainer};
use crate::config::{save_params_snapshot, validate_params, TrainParams};
use crate::data::{
    Batch, BatchQueue, BatchSampler, FeatureSource, KaldiCorpus, QueueConfig, SamplerConfig,
    SelectedDim, SpeakerIndex,
};
use crate::error::{Error, Result};
use crate::model::StatsPoolingClassifier;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sub-directory of the model directory holding network state
pub const NNET_DIR: &str = "nnet";
/// Feature dimension side file inside [`NNET_DIR`]
pub const FEATURE_DIM_FILE: &str = "feature_dim";
/// Validation loss tracker inside [`NNET_DIR`]
pub const TRACKER_FILE: &str = "valid_loss";

/// Offset separating the validation batch sequence from the training one
const VALID_SEED_OFFSET: u64 = 0x5EE_D0F7_A11D;

/// A corpus directory and its speaker list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSet {
    pub dir: PathBuf,
    pub spklist: PathBuf,
}

impl DataSet {
    pub fn new(dir: impl Into<PathBuf>, spklist: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            spklist: spklist.into(),
        }
    }
}

/// Everything a sweep run needs
#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub params: TrainParams,
    pub train: DataSet,
    pub valid: Option<DataSet>,
    pub model_dir: PathBuf,
    pub num_devices: usize,
    pub tune_period: usize,
    pub stop: StopFlag,
}

type SharedSource = Arc<dyn FeatureSource>;

/// Open a corpus, narrowed to `selected_dim` columns when set
fn open_source(dir: &Path, selected_dim: Option<usize>) -> Result<SharedSource> {
    let corpus = KaldiCorpus::open(dir)?;
    Ok(match selected_dim {
        Some(dim) => Arc::new(SelectedDim::new(corpus, dim)?),
        None => Arc::new(corpus),
    })
}

/// Fail unless every listed speaker is in the corpus with enough utterances
fn check_speakers(source: &dyn FeatureSource, index: &SpeakerIndex, required: usize) -> Result<()> {
    for speaker in index.speakers() {
        let available = source.utterance_count(speaker)?;
        if available < required {
            return Err(Error::InsufficientUtterances {
                speaker: speaker.clone(),
                available,
                required,
            });
        }
    }
    Ok(())
}

fn write_feature_dim(nnet_dir: &Path, dim: usize) -> Result<()> {
    let path = nnet_dir.join(FEATURE_DIM_FILE);
    fs::write(&path, format!("{dim}\n"))
        .map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

/// Fixed validation batches drawn from the validation set
fn validation_batches(
    params: &TrainParams,
    valid: &DataSet,
    num_train_speakers: usize,
) -> Result<Vec<Batch>> {
    let source = open_source(&valid.dir, params.selected_dim)?;
    let index = SpeakerIndex::load(&valid.spklist)?;
    if index.len() > num_train_speakers {
        return Err(Error::Data(format!(
            "the validation speaker list has {} speakers but the network only has {} output classes",
            index.len(),
            num_train_speakers
        )));
    }
    check_speakers(source.as_ref(), &index, params.num_segments_per_speaker)?;

    let config = SamplerConfig {
        seed: params.seed.wrapping_add(VALID_SEED_OFFSET),
        ..SamplerConfig::from(params)
    };
    let sampler = BatchSampler::new(source, index, config)?;
    (0..params.num_valid_batches as u64)
        .map(|k| sampler.sample(k))
        .collect()
}

/// Run a learning-rate sweep end to end
///
/// Configuration problems are reported before anything is written to the
/// model directory. An existing checkpoint in the model directory is resumed.
pub fn run_sweep(request: &SweepRequest) -> Result<SweepReport> {
    let params = &request.params;
    validate_params(params)?;
    if request.tune_period == 0 {
        return Err(Error::config("tune_period", "must be positive"));
    }
    check_device_split(params.batch_size(), request.num_devices)?;

    let train_source = open_source(&request.train.dir, params.selected_dim)?;
    let train_index = SpeakerIndex::load(&request.train.spklist)?;
    check_speakers(train_source.as_ref(), &train_index, params.num_segments_per_speaker)?;
    let dim = train_source.dimension();
    tracing::info!(
        speakers = train_index.len(),
        dim,
        "there are {} speakers in the training set and the feature dimension is {}",
        train_index.len(),
        dim
    );

    let sampler = Arc::new(BatchSampler::new(
        train_source,
        train_index,
        SamplerConfig::from(params),
    )?);
    let num_classes = sampler.speakers().len();
    let validation = request
        .valid
        .as_ref()
        .map(|valid| validation_batches(params, valid, num_classes))
        .transpose()?;

    let nnet_dir = request.model_dir.join(NNET_DIR);
    fs::create_dir_all(&nnet_dir)
        .map_err(|e| Error::io(format!("creating {}", nnet_dir.display()), e))?;
    write_feature_dim(&nnet_dir, dim)?;
    save_params_snapshot(params, &request.model_dir)?;

    let model = StatsPoolingClassifier::new(dim, params.embedding_dim, num_classes)?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut trainer = build_trainer(Box::new(model), params, request.num_devices, &mut rng)?;
    let result = sweep_with(trainer.as_mut(), request, sampler, validation);
    trainer.close();
    result
}

fn sweep_with(
    trainer: &mut dyn Trainer,
    request: &SweepRequest,
    sampler: Arc<BatchSampler<SharedSource>>,
    validation: Option<Vec<Batch>>,
) -> Result<SweepReport> {
    let params = &request.params;
    let nnet_dir = request.model_dir.join(NNET_DIR);
    let trace_path = request.model_dir.join(TRACE_FILE);

    trainer.build(Stage::Train)?;
    if validation.is_some() {
        trainer.build(Stage::Valid)?;
    }

    let checkpointer = Checkpointer::new(&nnet_dir);
    let (state, trace) = match checkpointer.load_latest()? {
        Some(checkpoint) => {
            let step = checkpoint.state.global_step;
            tracing::warn!(step, dir = %nnet_dir.display(), "resuming from an existing checkpoint");
            trainer.restore(checkpoint.params, checkpoint.slots)?;
            (checkpoint.state, LrTrace::resume(&trace_path, step)?)
        }
        None => (TrainingState::default(), LrTrace::create(&trace_path)?),
    };

    let mut queue = BatchQueue::spawn(
        sampler,
        QueueConfig {
            num_workers: params.num_parallel_datasets,
            capacity: params.queue_capacity,
            start_index: state.global_step as u64,
            limit: None,
        },
    )?;

    let mut controller = SweepController::new(trainer, &params.lr_sweep, request.tune_period, trace, state)?
        .with_checkpointer(checkpointer, params.checkpoint_every_period)
        .with_stop_flag(request.stop.clone());
    if let Some(batches) = validation {
        let tracker_path = nnet_dir.join(TRACKER_FILE);
        let tracker = LossTracker::load(&tracker_path)?;
        controller = controller.with_validation(batches, tracker, tracker_path);
    }

    let result = controller.run(&mut queue);
    queue.close();
    result
}
