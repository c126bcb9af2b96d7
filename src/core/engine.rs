//! Separation engine: the capability interface the pipeline talks to, and
//! the ONNX Runtime implementation of it for htdemucs exports.

use std::path::Path;

use ndarray::{s, Array3, Array4, ArrayView2, ArrayView3, Axis};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, Value},
};
use tracing::{debug, info};

use crate::{
    core::dsp::{istft_cac_stereo, stft_cac_stereo},
    error::{Result, StemError},
    io::progress::{emit_split_progress, SplitProgress},
    model::model_manager::{ensure_model, ModelHandle},
    types::{ModelManifest, SeparationResult, Waveform, MODEL_SAMPLE_RATE, STEM_ORDER},
};

/// A loaded separation model.
pub trait StemModel {
    /// Rate the model expects its input at.
    fn sample_rate(&self) -> u32 {
        MODEL_SAMPLE_RATE
    }

    /// Separates a batch of one waveform, shape `[1, channels, frames]`, into
    /// `[1, 4, channels, frames]` with sources in [`STEM_ORDER`].
    fn apply(&mut self, batch: ArrayView3<'_, f32>) -> Result<Array4<f32>>;
}

/// Turns a model name into a loaded model.
pub trait ModelProvider {
    type Model: StemModel;

    fn load_model(&self, name: &str) -> Result<Self::Model>;
}

/// Runs `model` on `audio` and splits the output into labelled stems.
///
/// The output must have the input's channel and frame counts; anything else
/// is rejected rather than written out under the wrong labels.
pub fn apply_model<M: StemModel + ?Sized>(
    model: &mut M,
    audio: &Waveform,
) -> Result<SeparationResult> {
    let (channels, frames) = (audio.channels(), audio.frames());
    let batch = audio.view().insert_axis(Axis(0));

    let out = model.apply(batch)?;

    let expected = [1, STEM_ORDER.len(), channels, frames];
    if out.shape() != expected {
        return Err(StemError::OutputShape {
            got: out.shape().to_vec(),
            expected: expected.to_vec(),
        });
    }

    let stems = STEM_ORDER.map(|stem| {
        Waveform::new(
            out.slice(s![0, stem.index(), .., ..]).to_owned(),
            audio.sample_rate,
        )
    });
    Ok(SeparationResult::new(stems))
}

// htdemucs ONNX export geometry
pub const DEMUCS_T: usize = 343_980;
const DEMUCS_F: usize = 2048;
const DEMUCS_FRAMES: usize = 336;
const DEMUCS_NFFT: usize = 4096;
const DEMUCS_HOP: usize = 1024;

const INPUT_TIME: &str = "input";
const INPUT_SPEC: &str = "x";
const OUTPUT_TIME: &str = "add_67";
const OUTPUT_SPEC: &str = "output";

/// Resolves names through the model registry and the local model cache.
#[derive(Clone, Debug, Default)]
pub struct OrtProvider {
    pub manifest_url_override: Option<String>,
}

impl OrtProvider {
    pub fn new(manifest_url_override: Option<String>) -> Self {
        Self {
            manifest_url_override,
        }
    }
}

impl ModelProvider for OrtProvider {
    type Model = OrtModel;

    fn load_model(&self, name: &str) -> Result<OrtModel> {
        let handle = ensure_model(name, self.manifest_url_override.as_deref())?;
        OrtModel::from_handle(&handle)
    }
}

/// htdemucs exported to ONNX, run window by window.
pub struct OrtModel {
    session: Session,
    manifest: ModelManifest,
    source_order: [usize; 4],
}

impl OrtModel {
    pub fn from_handle(handle: &ModelHandle) -> Result<Self> {
        Self::from_file(&handle.local_path, handle.manifest.clone())
    }

    pub fn from_file(path: &Path, manifest: ModelManifest) -> Result<Self> {
        let source_order = check_manifest(&manifest)?;

        info!("loading ONNX model {} from {}", manifest.name, path.display());
        let load_err =
            |e: String| StemError::Model(format!("failed to load {}: {e}", path.display()));
        let session = Session::builder()
            .map_err(|e| load_err(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| load_err(e.to_string()))?;

        Ok(Self {
            session,
            manifest,
            source_order,
        })
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }
}

impl StemModel for OrtModel {
    fn sample_rate(&self) -> u32 {
        self.manifest.sample_rate
    }

    fn apply(&mut self, batch: ArrayView3<'_, f32>) -> Result<Array4<f32>> {
        let (b, _, n) = batch.dim();
        if b != 1 {
            return Err(StemError::Inference(format!("expected a batch of 1, got {b}")));
        }
        if n == 0 {
            return Err(StemError::Inference("empty audio".into()));
        }

        let (win, hop) = (self.manifest.window, self.manifest.hop);
        let session = &mut self.session;
        let sources = overlap_add(batch.index_axis(Axis(0), 0), win, hop, |l, r| {
            run_window_demucs(session, l, r)
        })?;

        let ordered = ndarray::stack(
            Axis(0),
            &self
                .source_order
                .map(|src| sources.index_axis(Axis(0), src)),
        )?;
        Ok(ordered.insert_axis(Axis(0)))
    }
}

/// Runs `run_window` over hop-spaced, zero-padded windows of `audio`
/// (`[channels, frames]`, mono or stereo) and stitches the results with
/// linear cross-fades.
///
/// The runner gets `win` stereo frames and returns `[4, 2, win]`. The result
/// is `[4, channels, frames]`; mono input is duplicated on the way in and
/// averaged on the way out.
pub fn overlap_add<F>(
    audio: ArrayView2<'_, f32>,
    win: usize,
    hop: usize,
    mut run_window: F,
) -> Result<Array3<f32>>
where
    F: FnMut(&[f32], &[f32]) -> Result<Array3<f32>>,
{
    if win == 0 || hop == 0 || hop > win {
        return Err(StemError::Inference(format!("bad window/hop {win}/{hop}")));
    }
    let (channels, n) = audio.dim();
    let (left, right) = stereo_pair(audio)?;

    let windows = window_count(n, win, hop);
    let ramp = (win - hop).max(1);
    let sources = STEM_ORDER.len();

    let mut acc = Array3::<f32>::zeros((sources, 2, n));
    let mut weights = vec![0.0f32; n];
    let mut left_win = vec![0.0f32; win];
    let mut right_win = vec![0.0f32; win];

    emit_split_progress(SplitProgress::Chunks {
        done: 0,
        total: windows,
    });

    for k in 0..windows {
        let pos = k * hop;
        let len = win.min(n - pos);

        left_win.fill(0.0);
        right_win.fill(0.0);
        left_win[..len].copy_from_slice(&left[pos..pos + len]);
        right_win[..len].copy_from_slice(&right[pos..pos + len]);

        let out = run_window(&left_win, &right_win)?;
        if out.dim() != (sources, 2, win) {
            return Err(StemError::OutputShape {
                got: out.shape().to_vec(),
                expected: vec![sources, 2, win],
            });
        }

        for i in 0..len {
            let w = (i + 1).min(win - i).min(ramp) as f32;
            weights[pos + i] += w;
            for st in 0..sources {
                acc[(st, 0, pos + i)] += out[(st, 0, i)] * w;
                acc[(st, 1, pos + i)] += out[(st, 1, i)] * w;
            }
        }

        debug!("window {}/{} at frame {}", k + 1, windows, pos);
        emit_split_progress(SplitProgress::Chunks {
            done: k + 1,
            total: windows,
        });
    }

    for (i, w) in weights.iter().enumerate() {
        if *w > 0.0 {
            acc.slice_mut(s![.., .., i]).mapv_inplace(|x| x / w);
        }
    }

    if channels == 1 {
        Ok(acc
            .mean_axis(Axis(1))
            .ok_or_else(|| StemError::Inference("empty channel axis".into()))?
            .insert_axis(Axis(1)))
    } else {
        Ok(acc)
    }
}

fn check_manifest(mf: &ModelManifest) -> Result<[usize; 4]> {
    let source_order = mf.source_order().map_err(StemError::Model)?;
    if mf.window != DEMUCS_T {
        return Err(StemError::Model(format!(
            "model window is {} frames, expected {}",
            mf.window, DEMUCS_T
        )));
    }
    if !(mf.hop > 0 && mf.hop <= mf.window) {
        return Err(StemError::Model(format!(
            "bad window/hop in manifest: {}/{}",
            mf.window, mf.hop
        )));
    }
    Ok(source_order)
}

/// Number of hop-spaced windows needed to cover `n` frames.
pub fn window_count(n: usize, win: usize, hop: usize) -> usize {
    if n <= win {
        1
    } else {
        1 + (n - win).div_ceil(hop)
    }
}

fn stereo_pair(audio: ArrayView2<'_, f32>) -> Result<(Vec<f32>, Vec<f32>)> {
    match audio.nrows() {
        1 => {
            let mono = audio.row(0).to_vec();
            Ok((mono.clone(), mono))
        }
        2 => Ok((audio.row(0).to_vec(), audio.row(1).to_vec())),
        c => Err(StemError::Inference(format!(
            "htdemucs takes mono or stereo input, got {c} channels"
        ))),
    }
}

fn inference_err(e: impl std::fmt::Display) -> StemError {
    StemError::Inference(e.to_string())
}

/// One forward pass over exactly `DEMUCS_T` stereo frames. Returns
/// `[4, 2, DEMUCS_T]` in the model's own source order.
pub fn run_window_demucs(
    session: &mut Session,
    left: &[f32],
    right: &[f32],
) -> Result<Array3<f32>> {
    if left.len() != right.len() {
        return Err(StemError::Inference("L/R length mismatch".into()));
    }
    let t = left.len();
    if t != DEMUCS_T {
        return Err(StemError::Inference(format!(
            "bad window length {t} (expected {DEMUCS_T})"
        )));
    }

    // time branch [1, 2, T], planar
    let mut planar = Vec::with_capacity(2 * t);
    planar.extend_from_slice(left);
    planar.extend_from_slice(right);
    let time_value: Value = Tensor::from_array(([1usize, 2, t], planar))
        .map_err(inference_err)?
        .into_dyn();

    // spectral branch [1, 4, F, Frames]
    let (spec_cac, f_bins, frames) = stft_cac_stereo(left, right, DEMUCS_NFFT, DEMUCS_HOP);
    if f_bins != DEMUCS_F || frames != DEMUCS_FRAMES {
        return Err(StemError::Inference(format!(
            "spec dims mismatch: got F={f_bins},Frames={frames}, expected F={DEMUCS_F},Frames={DEMUCS_FRAMES}"
        )));
    }
    let spec_value: Value = Tensor::from_array(([1usize, 4, f_bins, frames], spec_cac))
        .map_err(inference_err)?
        .into_dyn();

    let outputs = session
        .run(vec![
            (INPUT_TIME.to_string(), time_value),
            (INPUT_SPEC.to_string(), spec_value),
        ])
        .map_err(inference_err)?;

    let sources = STEM_ORDER.len();
    let time_out = outputs
        .get(OUTPUT_TIME)
        .ok_or_else(|| StemError::Inference(format!("model did not return `{OUTPUT_TIME}`")))?;
    let freq_out = outputs
        .get(OUTPUT_SPEC)
        .ok_or_else(|| StemError::Inference(format!("model did not return `{OUTPUT_SPEC}`")))?;

    let (_, time_data) = time_out.try_extract_tensor::<f32>().map_err(inference_err)?;
    let (_, freq_data) = freq_out.try_extract_tensor::<f32>().map_err(inference_err)?;

    let time_len = sources * 2 * t;
    if time_data.len() != time_len {
        return Err(StemError::Inference(format!(
            "unexpected `{OUTPUT_TIME}` length {} (expected {time_len})",
            time_data.len()
        )));
    }
    let spec_len = 4 * f_bins * frames;
    if freq_data.len() != sources * spec_len {
        return Err(StemError::Inference(format!(
            "unexpected `{OUTPUT_SPEC}` length {} (expected {})",
            freq_data.len(),
            sources * spec_len
        )));
    }

    // each source is the time branch plus the inverted spectral branch
    let mut out = Array3::<f32>::zeros((sources, 2, t));
    for src in 0..sources {
        let spec = &freq_data[src * spec_len..(src + 1) * spec_len];
        let (left_f, right_f) =
            istft_cac_stereo(spec, f_bins, frames, DEMUCS_NFFT, DEMUCS_HOP, t);

        let base = src * 2 * t;
        for (ch, from_spec) in [left_f, right_f].iter().enumerate() {
            let from_time = &time_data[base + ch * t..base + (ch + 1) * t];
            for (i, (a, b)) in from_time.iter().zip(from_spec).enumerate() {
                out[(src, ch, i)] = a + b;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_count_covers_the_signal() {
        assert_eq!(window_count(10, 100, 50), 1);
        assert_eq!(window_count(100, 100, 50), 1);
        assert_eq!(window_count(101, 100, 50), 2);
        assert_eq!(window_count(150, 100, 50), 2);
        assert_eq!(window_count(151, 100, 50), 3);
        for n in [1usize, 99, 100, 101, 333, 1000] {
            let k = window_count(n, 100, 30);
            assert!((k - 1) * 30 + 100 >= n, "n={n} k={k}");
        }
    }

    #[test]
    fn stereo_pair_duplicates_mono_and_rejects_surround() {
        let mono = ndarray::Array2::from_shape_vec((1, 3), vec![0.1, 0.2, 0.3]).unwrap();
        let (l, r) = stereo_pair(mono.view()).unwrap();
        assert_eq!(l, r);

        let six = ndarray::Array2::<f32>::zeros((6, 4));
        assert!(stereo_pair(six.view()).is_err());
    }
}
