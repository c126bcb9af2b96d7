use std::path::PathBuf;

use thiserror::Error;

/// Central error type for the stem-splitter crate.
#[derive(Debug, Error)]
pub enum StemError {
    // Helper failures carrying their own context chain
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),

    // Audio in/out
    #[error("Failed to open audio file {path}: {source}")]
    AudioOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode audio file {path}: {reason}")]
    AudioDecode { path: PathBuf, reason: String },

    #[error("Sample rate is {found} Hz, but the model expects {expected} Hz")]
    SampleRateMismatch { found: u32, expected: u32 },

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Failed to write stem {path}: {reason}")]
    StemWrite { path: PathBuf, reason: String },

    // Model resolution and inference
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Checksum mismatch for {path}")]
    Checksum { path: String },

    #[error("Cache dir not available")]
    CacheDirUnavailable,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model output has shape {got:?}, expected {expected:?}")]
    OutputShape {
        got: Vec<usize>,
        expected: Vec<usize>,
    },

    // Wrapped library errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, StemError>;
