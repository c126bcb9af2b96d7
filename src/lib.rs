//! # stem-splitter
//!
//! Splits a music file into drums, bass, other and vocals with a pretrained
//! separation model: decode, bring to 44.1 kHz, run the model, write one WAV
//! per stem.

mod error;
mod types;

pub mod core {
    pub mod audio;
    pub mod dsp;
    pub mod engine;
    pub mod resample;
    pub mod splitter;
    pub mod stage;
}

pub mod model {
    pub mod model_manager;
    pub mod registry;
}

pub mod io {
    pub mod crypto;
    pub mod net;
    pub mod paths;
    pub mod progress;
}

// Public API
pub use crate::core::audio::{read_audio, write_wav, write_wav_pcm16};
pub use crate::core::engine::{apply_model, ModelProvider, OrtModel, OrtProvider, StemModel};
pub use crate::core::resample::{normalize_rate, resample, resampled_len};
pub use crate::core::splitter::{resolve_output_dir, split_file, split_file_with, write_stems};
pub use crate::core::stage::{Severity, Stage, StageError};
pub use crate::error::{Result, StemError};
pub use crate::io::progress::{
    set_download_progress_callback, set_split_progress_callback, SplitProgress,
};
pub use crate::model::model_manager::{ensure_model, ModelHandle};
pub use crate::types::{
    ModelArtifact, ModelManifest, RateMismatchPolicy, SeparationResult, SplitOptions,
    SplitReport, Stem, StemOutcome, Waveform, DEFAULT_MODEL, MODEL_SAMPLE_RATE, STEM_ORDER,
};

