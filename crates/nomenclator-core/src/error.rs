use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during Nomenclator operations.
#[derive(Debug, Error)]
pub enum NomenclatorError {
    /// A training example names a label that is not in the label set.
    #[error("label {label:?} is not part of the label set")]
    UnknownLabel {
        /// The offending label.
        label: String,
    },

    /// The same standardized name was listed twice.
    #[error("duplicate label {0:?} in label set")]
    DuplicateLabel(String),

    /// A label set must contain at least one name.
    #[error("label set is empty")]
    EmptyLabelSet,

    /// Hyperparameters or training settings are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The model bundle is missing or its contents are unusable.
    #[error("failed to load model bundle {path:?}: {reason}")]
    BundleLoad {
        /// Path that was being read.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The bundle was written by an incompatible schema.
    #[error("unsupported bundle schema version {found} (expected {expected})")]
    UnsupportedBundleVersion {
        /// Version stored in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// A classifier parameter was absent from an imported parameter set.
    #[error("missing model parameter: {0}")]
    MissingParameter(String),

    /// The parameter store lock was poisoned by a panicking writer.
    #[error("model parameters are unavailable: {0}")]
    ParameterLock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for Nomenclator operations.
pub type Result<T> = std::result::Result<T, NomenclatorError>;
