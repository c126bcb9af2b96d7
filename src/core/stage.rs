//! Pipeline stages and how hard each one fails.

use std::fmt;

use thiserror::Error;

use crate::error::StemError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ResolveOutput,
    LoadAudio,
    NormalizeRate,
    LoadModel,
    Separate,
    WriteStem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Stop the run and exit non-zero.
    Fatal,
    /// Report, then continue with the remaining work.
    Recoverable,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ResolveOutput,
        Stage::LoadAudio,
        Stage::NormalizeRate,
        Stage::LoadModel,
        Stage::Separate,
        Stage::WriteStem,
    ];

    /// Only stem writes are recoverable.
    pub const fn severity(self) -> Severity {
        match self {
            Stage::ResolveOutput
            | Stage::LoadAudio
            | Stage::NormalizeRate
            | Stage::LoadModel
            | Stage::Separate => Severity::Fatal,
            Stage::WriteStem => Severity::Recoverable,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::ResolveOutput => "resolve_output",
            Stage::LoadAudio => "load_audio",
            Stage::NormalizeRate => "normalize_rate",
            Stage::LoadModel => "load_model",
            Stage::Separate => "separate",
            Stage::WriteStem => "write_stem",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error tagged with the stage that raised it.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: StemError,
}

impl StageError {
    pub fn new(stage: Stage, source: StemError) -> Self {
        Self { stage, source }
    }

    pub fn severity(&self) -> Severity {
        self.stage.severity()
    }
}

pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageError>;
}

impl<T, E: Into<StemError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|e| StageError::new(stage, e.into()))
    }
}
