//! Shared fixtures: synthetic Kaldi-style corpora and sweep configs

#![allow(dead_code)]

use ndarray::Array2;
use spktrain::config::TrainParams;
use spktrain::train::{DataSet, StopFlag, SweepRequest};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Write `num_speakers` speakers with `utts_per_speaker` utterances each
///
/// Every speaker's frames are centered on its own offset so the classifier
/// has something to learn. Returns the data directory and its speaker list.
pub fn write_corpus(
    root: &Path,
    name: &str,
    num_speakers: usize,
    utts_per_speaker: usize,
    dim: usize,
) -> DataSet {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("feats")).unwrap();

    let mut scp = String::new();
    let mut spk2utt = String::new();
    let mut spklist = String::new();
    for s in 0..num_speakers {
        let speaker = format!("spk{s:03}");
        write!(spk2utt, "{speaker}").unwrap();
        for u in 0..utts_per_speaker {
            let utt = format!("{speaker}-utt{u}");
            let frames = 12 + 3 * u;
            let feats = Array2::from_shape_fn((frames, dim), |(t, d)| {
                s as f32 * 0.3 + 0.05 * ((t * 7 + d * 3 + u) % 5) as f32
            });
            let path = dir.join("feats").join(format!("{utt}.npy"));
            ndarray_npy::write_npy(&path, &feats).unwrap();
            writeln!(scp, "{utt} feats/{utt}.npy").unwrap();
            write!(spk2utt, " {utt}").unwrap();
        }
        spk2utt.push('\n');
        writeln!(spklist, "{speaker} {s}").unwrap();
    }

    fs::write(dir.join("feats.scp"), scp).unwrap();
    fs::write(dir.join("spk2utt"), spk2utt).unwrap();
    let spklist_path = dir.join("spklist");
    fs::write(&spklist_path, spklist).unwrap();
    DataSet::new(dir, spklist_path)
}

/// Small, fast parameters
pub fn small_params(num_speakers_per_batch: usize, num_segments_per_speaker: usize) -> TrainParams {
    let mut params = TrainParams::new(11, num_speakers_per_batch, num_segments_per_speaker);
    params.min_segment_len = 4;
    params.max_segment_len = 8;
    params.embedding_dim = 8;
    params.num_valid_batches = 2;
    params
}

pub fn request(
    params: TrainParams,
    train: DataSet,
    valid: Option<DataSet>,
    model_dir: PathBuf,
    num_devices: usize,
    tune_period: usize,
) -> SweepRequest {
    SweepRequest {
        params,
        train,
        valid,
        model_dir,
        num_devices,
        tune_period,
        stop: StopFlag::new(),
    }
}
