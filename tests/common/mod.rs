#![allow(dead_code)]

use std::{f32::consts::PI, path::Path};

use ndarray::{Array2, Array4, ArrayView3};
use stem_splitter::{write_wav_pcm16, ModelProvider, Result, StemError, StemModel, Waveform};

/// `channels` x `secs` of a 440/660 Hz tone pair at `rate`.
pub fn tone(rate: u32, channels: usize, secs: f32) -> Waveform {
    let frames = (rate as f32 * secs).round() as usize;
    let samples = Array2::from_shape_fn((channels, frames), |(ch, i)| {
        let f = if ch % 2 == 0 { 440.0 } else { 660.0 };
        (2.0 * PI * f * i as f32 / rate as f32).sin() * 0.25
    });
    Waveform::new(samples, rate)
}

pub fn write_tone(path: &Path, rate: u32, channels: usize, secs: f32) -> Waveform {
    let w = tone(rate, channels, secs);
    write_wav_pcm16(path, &w).expect("write fixture");
    w
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Source `s` is the input scaled by `(s + 1) / 10`.
#[derive(Clone, Default)]
pub struct ScaledCopies;

impl StemModel for ScaledCopies {
    fn apply(&mut self, batch: ArrayView3<'_, f32>) -> Result<Array4<f32>> {
        let (b, c, t) = batch.dim();
        Ok(Array4::from_shape_fn((b, 4, c, t), |(bi, s, ch, i)| {
            batch[(bi, ch, i)] * (s as f32 + 1.0) / 10.0
        }))
    }
}

/// Fails every inference call.
#[derive(Clone, Default)]
pub struct Exploding;

impl StemModel for Exploding {
    fn apply(&mut self, _batch: ArrayView3<'_, f32>) -> Result<Array4<f32>> {
        Err(StemError::Inference("out of memory".into()))
    }
}

/// Returns three sources instead of four.
#[derive(Clone, Default)]
pub struct ThreeStems;

impl StemModel for ThreeStems {
    fn apply(&mut self, batch: ArrayView3<'_, f32>) -> Result<Array4<f32>> {
        let (b, c, t) = batch.dim();
        Ok(Array4::zeros((b, 3, c, t)))
    }
}

/// A model trained at 48 kHz.
#[derive(Clone, Default)]
pub struct Rate48k;

impl StemModel for Rate48k {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn apply(&mut self, batch: ArrayView3<'_, f32>) -> Result<Array4<f32>> {
        ScaledCopies.apply(batch)
    }
}

/// Hands out clones of one model for any name.
pub struct Provide<M>(pub M);

impl<M: StemModel + Clone> ModelProvider for Provide<M> {
    type Model = M;

    fn load_model(&self, _name: &str) -> Result<M> {
        Ok(self.0.clone())
    }
}

/// Knows no models at all.
pub struct Unavailable;

impl ModelProvider for Unavailable {
    type Model = ScaledCopies;

    fn load_model(&self, name: &str) -> Result<ScaledCopies> {
        Err(StemError::Registry(format!(
            "Model `{name}` not found in registry"
        )))
    }
}
