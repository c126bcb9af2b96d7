use ndarray::Array2;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::{
    error::{Result, StemError},
    types::{RateMismatchPolicy, Waveform, MODEL_SAMPLE_RATE},
};

/// Brings `audio` to [`MODEL_SAMPLE_RATE`] according to `policy`.
///
/// Audio already at the model rate is returned untouched. Under
/// [`RateMismatchPolicy::Reject`] any other rate is an error; under
/// [`RateMismatchPolicy::Resample`] it is converted.
pub fn normalize_rate(audio: Waveform, policy: RateMismatchPolicy) -> Result<Waveform> {
    if audio.sample_rate == MODEL_SAMPLE_RATE {
        debug!("sample rate already {} Hz", MODEL_SAMPLE_RATE);
        return Ok(audio);
    }

    match policy {
        RateMismatchPolicy::Reject => Err(StemError::SampleRateMismatch {
            found: audio.sample_rate,
            expected: MODEL_SAMPLE_RATE,
        }),
        RateMismatchPolicy::Resample => resample(&audio, MODEL_SAMPLE_RATE),
    }
}

/// Number of frames `frames` input frames become at the new rate.
pub fn resampled_len(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    (frames as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

/// Sinc resampling of the whole signal in one pass.
///
/// The output is aligned with the input and has exactly [`resampled_len`]
/// frames. The channel count is unchanged.
pub fn resample(audio: &Waveform, to_rate: u32) -> Result<Waveform> {
    let from_rate = audio.sample_rate;
    if from_rate == 0 || to_rate == 0 {
        return Err(StemError::Resample(format!(
            "cannot resample from {from_rate} Hz to {to_rate} Hz"
        )));
    }
    if from_rate == to_rate {
        return Ok(audio.clone());
    }

    let channels = audio.channels();
    let frames = audio.frames();
    let target = resampled_len(frames, from_rate, to_rate);

    if frames == 0 || channels == 0 {
        return Ok(Waveform::new(Array2::zeros((channels, 0)), to_rate));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0,
        params,
        frames,
        channels,
    )
    .map_err(|e| StemError::Resample(format!("failed to create resampler: {e}")))?;

    let planar_in: Vec<Vec<f32>> = (0..channels).map(|ch| audio.channel(ch).to_vec()).collect();

    // a single whole-signal call comes out aligned with the input
    let mut planar_out = resampler
        .process(&planar_in, None)
        .map_err(|e| StemError::Resample(e.to_string()))?;

    while planar_out[0].len() < target {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| StemError::Resample(e.to_string()))?;
        if tail[0].is_empty() {
            break;
        }
        for (out, t) in planar_out.iter_mut().zip(tail) {
            out.extend(t);
        }
    }

    let samples = Array2::from_shape_fn((channels, target), |(ch, i)| {
        planar_out[ch].get(i).copied().unwrap_or(0.0)
    });

    debug!(
        "resampled {} frames at {} Hz to {} frames at {} Hz ({} channels)",
        frames, from_rate, target, to_rate, channels
    );

    Ok(Waveform::new(samples, to_rate))
}
