//! Crate-wide error type.
//!
//! Every failure in the core is fatal to the run: nothing here is retried,
//! errors simply propagate to the driver which reports them and exits.

use thiserror::Error;

/// Result alias used across the public API.
pub type Result<T> = std::result::Result<T, KwsError>;

#[derive(Debug, Error)]
pub enum KwsError {
    /// A waveform is longer than the configured fixed clip length.
    #[error("waveform has {len} samples but no sample may exceed {max} (the fixed clip length)")]
    LengthExceeded { len: usize, max: usize },

    /// Classifier input/output shape disagrees with what the loop expects.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Invalid configuration detected before any training step runs.
    #[error("configuration: {0}")]
    Configuration(String),

    /// A dataset split has no samples; metrics over it would be undefined.
    #[error("dataset split \"{0}\" contains no samples")]
    EmptyDataset(String),

    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("resampler: {0}")]
    Resample(String),

    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// The prefetch worker hung up before delivering every batch.
    #[error("data loader worker disconnected")]
    LoaderDisconnected,
}

impl KwsError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<rubato::ResamplerConstructionError> for KwsError {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        Self::Resample(err.to_string())
    }
}

impl From<rubato::ResampleError> for KwsError {
    fn from(err: rubato::ResampleError) -> Self {
        Self::Resample(err.to_string())
    }
}
