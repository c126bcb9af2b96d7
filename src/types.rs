use std::{
    fmt,
    path::{Path, PathBuf},
};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Sample rate every supported separation model runs at.
pub const MODEL_SAMPLE_RATE: u32 = 44_100;

/// Model used when none is given on the command line.
pub const DEFAULT_MODEL: &str = "htdemucs_ort_v1";

/// One of the four sources a model separates a mix into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Drums,
    Bass,
    Other,
    Vocals,
}

/// Order of the sources in a separation result, and the native output order
/// of the htdemucs family. Models that list their stems in a manifest are
/// remapped to this order by name (see [`ModelManifest::source_order`]).
pub const STEM_ORDER: [Stem; 4] = [Stem::Drums, Stem::Bass, Stem::Other, Stem::Vocals];

impl Stem {
    pub fn label(self) -> &'static str {
        match self {
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
            Stem::Vocals => "vocals",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.wav", self.label())
    }

    /// Position of this stem in the model output.
    pub fn index(self) -> usize {
        STEM_ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Planar audio buffer, shape `(channels, frames)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Builds a waveform from interleaved frames (`L R L R ...`).
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = interleaved.len() / channels;
        let samples = Array2::from_shape_fn((channels, frames), |(ch, i)| {
            interleaved[i * channels + ch]
        });
        Self::new(samples, sample_rate)
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.samples.view()
    }

    pub fn channel(&self, ch: usize) -> ArrayView1<'_, f32> {
        self.samples.row(ch)
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.samples.len());
        for frame in self.samples.axis_iter(Axis(1)) {
            out.extend(frame.iter().copied());
        }
        out
    }
}

/// The four stems returned by a model, in `STEM_ORDER`.
#[derive(Clone, Debug)]
pub struct SeparationResult {
    stems: [Waveform; 4],
}

impl SeparationResult {
    pub fn new(stems: [Waveform; 4]) -> Self {
        Self { stems }
    }

    pub fn get(&self, stem: Stem) -> &Waveform {
        &self.stems[stem.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stem, &Waveform)> {
        STEM_ORDER.iter().copied().zip(self.stems.iter())
    }
}

/// What to do when the input is not at [`MODEL_SAMPLE_RATE`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RateMismatchPolicy {
    /// Abort before separation.
    Reject,
    /// Convert to the model rate and carry on.
    #[default]
    Resample,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitOptions {
    pub output_dir: PathBuf,
    pub model_name: String,
    pub manifest_url_override: Option<String>,
    pub on_rate_mismatch: RateMismatchPolicy,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            output_dir: ".".into(),
            model_name: DEFAULT_MODEL.into(),
            manifest_url_override: None,
            on_rate_mismatch: RateMismatchPolicy::default(),
        }
    }
}

impl SplitOptions {
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn model(mut self, name: &str) -> Self {
        self.model_name = name.to_string();
        self
    }

    pub fn manifest_url(mut self, url: Option<String>) -> Self {
        self.manifest_url_override = url;
        self
    }

    pub fn on_rate_mismatch(mut self, policy: RateMismatchPolicy) -> Self {
        self.on_rate_mismatch = policy;
        self
    }
}

/// Result of one stem write attempt.
#[derive(Clone, Debug)]
pub struct StemOutcome {
    pub stem: Stem,
    pub path: PathBuf,
    pub error: Option<String>,
}

impl StemOutcome {
    pub fn is_written(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct SplitReport {
    pub output_dir: PathBuf,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
    pub stems: Vec<StemOutcome>,
}

impl SplitReport {
    pub fn written(&self) -> usize {
        self.stems.iter().filter(|s| s.is_written()).count()
    }

    pub fn failed(&self) -> usize {
        self.stems.len() - self.written()
    }

    pub fn path_of(&self, stem: Stem) -> Option<&Path> {
        self.stems
            .iter()
            .find(|s| s.stem == stem && s.is_written())
            .map(|s| s.path.as_path())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelArtifact {
    pub file: String,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelManifest {
    pub name: String,
    pub version: String,
    pub backend: String,
    pub sample_rate: u32,
    pub window: usize,
    pub hop: usize,
    #[serde(default)]
    pub stems: Vec<String>,
    #[serde(default)]
    pub input_layout: String,
    #[serde(default)]
    pub output_layout: String,
    pub artifacts: Vec<ModelArtifact>,
}

impl ModelManifest {
    /// First ONNX artifact, falling back to the first listed one.
    pub fn resolve_primary_artifact(&self) -> Result<&ModelArtifact, String> {
        self.artifacts
            .iter()
            .find(|a| a.file.to_ascii_lowercase().ends_with(".onnx"))
            .or_else(|| self.artifacts.first())
            .ok_or_else(|| format!("Manifest for `{}` lists no artifacts", self.name))
    }

    /// For each stem in [`STEM_ORDER`], the index of the model output that
    /// carries it, looked up by name in `stems`. An empty list means the
    /// outputs already follow [`STEM_ORDER`].
    pub fn source_order(&self) -> Result<[usize; 4], String> {
        if self.stems.is_empty() {
            return Ok([0, 1, 2, 3]);
        }

        let declared: Vec<String> = self.stems.iter().map(|s| s.to_lowercase()).collect();
        let mut order = [0usize; 4];
        for (slot, stem) in order.iter_mut().zip(STEM_ORDER) {
            *slot = declared
                .iter()
                .position(|d| d == stem.label())
                .ok_or_else(|| {
                    format!(
                        "Model `{}` declares stems {:?} without `{}`",
                        self.name, self.stems, stem
                    )
                })?;
        }

        if declared.len() != STEM_ORDER.len() {
            return Err(format!(
                "Model `{}` declares {} stems {:?}, expected the four of {:?}",
                self.name,
                declared.len(),
                self.stems,
                STEM_ORDER.map(|s| s.label())
            ));
        }
        Ok(order)
    }
}
