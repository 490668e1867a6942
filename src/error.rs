//! Error types with actionable diagnostics.
//!
//! Errors fall into four families: configuration, data, execution and I/O.
//! Configuration and data errors are fatal before or during a run and are
//! never retried; execution errors keep the underlying message unmodified so
//! low-level diagnostics survive.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spktrain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or running a sweep.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found at expected path.
    #[error("Configuration file not found: {path}\n  → Pass an existing YAML file with --config")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file has invalid syntax or is missing a required option.
    #[error("Invalid configuration in {path}:\n  {message}\n  → Check the YAML syntax and that seed, num_speakers_per_batch and num_segments_per_speaker are set")]
    ConfigParsing { path: PathBuf, message: String },

    /// Configuration value is invalid.
    #[error("Invalid configuration value for '{field}': {message}")]
    Config { field: String, message: String },

    /// Batch cannot be split evenly over the requested devices.
    #[error("To use multiple devices, the batch size must divide by the device count: batch_size={batch_size} (num_speakers_per_batch x num_segments_per_speaker), num_gpus={num_devices}\n  → Change num_speakers_per_batch, num_segments_per_speaker or --num-gpus")]
    IndivisibleBatch {
        batch_size: usize,
        num_devices: usize,
    },

    /// Speaker requested from a corpus or index that does not contain it.
    #[error("Speaker '{speaker}' is not present in the corpus or the speaker list")]
    MissingSpeaker { speaker: String },

    /// Speaker has fewer utterances than one batch needs.
    #[error("Speaker '{speaker}' has {available} utterance(s) but {required} segments per speaker are required\n  → Lower num_segments_per_speaker or remove the speaker from the speaker list")]
    InsufficientUtterances {
        speaker: String,
        available: usize,
        required: usize,
    },

    /// Corpus or speaker list content is malformed.
    #[error("Data error: {0}")]
    Data(String),

    /// Device execution failure (divergence, shape mismatch, resource exhaustion).
    #[error("{0}")]
    Execution(String),

    /// Trainer lifecycle misuse (build twice, step before build, use after close).
    #[error("Trainer state error: {0}")]
    State(String),

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration value error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error is caused by user input (config or data) rather than execution.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigParsing { .. }
                | Self::Config { .. }
                | Self::IndivisibleBatch { .. }
                | Self::MissingSpeaker { .. }
                | Self::InsufficientUtterances { .. }
                | Self::Data(_)
        )
    }

    /// Check if this error belongs to the configuration family.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigParsing { .. }
                | Self::Config { .. }
                | Self::IndivisibleBatch { .. }
        )
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "E001",
            Self::ConfigParsing { .. } => "E002",
            Self::Config { .. } => "E003",
            Self::IndivisibleBatch { .. } => "E004",
            Self::MissingSpeaker { .. } => "E010",
            Self::InsufficientUtterances { .. } => "E011",
            Self::Data(_) => "E012",
            Self::Execution(_) => "E020",
            Self::State(_) => "E030",
            Self::Io { .. } => "E050",
            Self::Serialization { .. } => "E051",
        }
    }
}

impl From<ndarray_npy::ReadNpyError> for Error {
    fn from(err: ndarray_npy::ReadNpyError) -> Self {
        Self::Data(format!("failed to read feature matrix: {err}"))
    }
}

impl From<ndarray_npy::WriteNpyError> for Error {
    fn from(err: ndarray_npy::WriteNpyError) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_unique() {
        let errors = vec![
            Error::ConfigNotFound { path: "".into() },
            Error::ConfigParsing {
                path: "".into(),
                message: "".into(),
            },
            Error::config("", ""),
            Error::IndivisibleBatch {
                batch_size: 8,
                num_devices: 3,
            },
            Error::MissingSpeaker { speaker: "".into() },
            Error::InsufficientUtterances {
                speaker: "".into(),
                available: 1,
                required: 2,
            },
            Error::Data("".into()),
            Error::Execution("".into()),
            Error::State("".into()),
            Error::io("", std::io::Error::other("x")),
            Error::Serialization { message: "".into() },
        ];

        let codes: Vec<_> = errors.iter().map(Error::code).collect();
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_indivisible_batch_reports_offending_values() {
        let err = Error::IndivisibleBatch {
            batch_size: 8,
            num_devices: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("batch_size=8"));
        assert!(msg.contains("num_gpus=3"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_execution_error_message_is_unmodified() {
        let err = Error::Execution("CUDA_ERROR_OUT_OF_MEMORY: out of memory".into());
        assert_eq!(err.to_string(), "CUDA_ERROR_OUT_OF_MEMORY: out of memory");
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_data_errors_are_user_errors() {
        assert!(Error::MissingSpeaker { speaker: "id1".into() }.is_user_error());
        assert!(!Error::MissingSpeaker { speaker: "id1".into() }.is_config_error());
        assert!(!Error::State("closed".into()).is_user_error());
    }

    #[test]
    fn test_insufficient_utterances_includes_counts() {
        let msg = Error::InsufficientUtterances {
            speaker: "spk7".into(),
            available: 1,
            required: 2,
        }
        .to_string();
        assert!(msg.contains("spk7"));
        assert!(msg.contains("1 utterance"));
        assert!(msg.contains("2 segments"));
    }

    #[test]
    fn test_io_error_constructor() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io("reading spk2utt", io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("reading spk2utt"));
    }
}
