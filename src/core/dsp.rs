use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use num_complex::Complex32;
use once_cell::sync::Lazy;
use rustfft::{num_traits::Zero, Fft, FftPlanner};

struct StftPlan {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

static PLANS: Lazy<Mutex<HashMap<usize, Arc<StftPlan>>>> = Lazy::new(Default::default);

fn plan(n_fft: usize) -> Arc<StftPlan> {
    let mut plans = PLANS.lock().unwrap_or_else(|p| p.into_inner());
    plans
        .entry(n_fft)
        .or_insert_with(|| {
            let mut planner = FftPlanner::new();
            Arc::new(StftPlan {
                fft: planner.plan_fft_forward(n_fft),
                ifft: planner.plan_fft_inverse(n_fft),
                window: hann(n_fft),
            })
        })
        .clone()
}

/// Symmetric Hann window.
pub fn hann(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

/// Number of STFT frames for `len` samples with center padding.
pub fn stft_frames(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Complex-as-channels spectrogram of a stereo signal, center padded by
/// `n_fft / 2` zeros on both sides.
///
/// Returns `(buffer, f_bins, frames)` where `buffer` is `[4, f_bins, frames]`
/// flattened row-major with channels `L.re, L.im, R.re, R.im`. Only the first
/// `n_fft / 2` bins are kept (the Nyquist bin is dropped), which is the layout
/// the htdemucs spectral branch consumes.
pub fn stft_cac_stereo(
    left: &[f32],
    right: &[f32],
    n_fft: usize,
    hop: usize,
) -> (Vec<f32>, usize, usize) {
    debug_assert_eq!(left.len(), right.len());
    debug_assert!(hop > 0 && n_fft >= 2 && n_fft % 2 == 0);

    let t = left.len().min(right.len());
    let pad = n_fft / 2;
    let f_bins = n_fft / 2;
    let frames = stft_frames(t, hop);
    let plane = f_bins * frames;

    let padded = |sig: &[f32]| {
        let mut p = vec![0.0f32; pad + t + pad];
        p[pad..pad + t].copy_from_slice(&sig[..t]);
        p
    };
    let l_sig = padded(left);
    let r_sig = padded(right);

    let plan = plan(n_fft);
    let mut out = vec![0.0f32; 4 * plane];
    let mut buf_l = vec![Complex32::zero(); n_fft];
    let mut buf_r = vec![Complex32::zero(); n_fft];

    for fr in 0..frames {
        let start = fr * hop;
        for i in 0..n_fft {
            let w = plan.window[i];
            buf_l[i] = Complex32::new(l_sig[start + i] * w, 0.0);
            buf_r[i] = Complex32::new(r_sig[start + i] * w, 0.0);
        }

        plan.fft.process(&mut buf_l);
        plan.fft.process(&mut buf_r);

        for fi in 0..f_bins {
            let at = fi * frames + fr;
            out[at] = buf_l[fi].re;
            out[plane + at] = buf_l[fi].im;
            out[2 * plane + at] = buf_r[fi].re;
            out[3 * plane + at] = buf_r[fi].im;
        }
    }

    (out, f_bins, frames)
}

/// Inverse of [`stft_cac_stereo`]: takes a `[4, f_bins, frames]` buffer
/// (`L.re, L.im, R.re, R.im`) and returns `target_len` samples per channel.
///
/// Frames are windowed again and overlap-added, then divided by the summed
/// squared window. Bins above `f_bins` are rebuilt as the conjugate mirror.
pub fn istft_cac_stereo(
    spec_cac: &[f32],
    f_bins: usize,
    frames: usize,
    n_fft: usize,
    hop: usize,
    target_len: usize,
) -> (Vec<f32>, Vec<f32>) {
    debug_assert!(f_bins <= n_fft / 2 + 1);
    debug_assert_eq!(spec_cac.len(), 4 * f_bins * frames);

    let plane = f_bins * frames;
    let pad = n_fft / 2;
    let padded_len = (pad + target_len + pad).max((frames.saturating_sub(1)) * hop + n_fft);

    let plan = plan(n_fft);
    let scale = 1.0 / n_fft as f32;

    let mut left = vec![0.0f32; padded_len];
    let mut right = vec![0.0f32; padded_len];
    let mut norm = vec![0.0f32; padded_len];
    let mut buf_l = vec![Complex32::zero(); n_fft];
    let mut buf_r = vec![Complex32::zero(); n_fft];

    for fr in 0..frames {
        buf_l.fill(Complex32::zero());
        buf_r.fill(Complex32::zero());

        for fi in 0..f_bins {
            let at = fi * frames + fr;
            buf_l[fi] = Complex32::new(spec_cac[at], spec_cac[plane + at]);
            buf_r[fi] = Complex32::new(spec_cac[2 * plane + at], spec_cac[3 * plane + at]);
        }
        for fi in 1..f_bins.min(n_fft - f_bins + 1) {
            buf_l[n_fft - fi] = buf_l[fi].conj();
            buf_r[n_fft - fi] = buf_r[fi].conj();
        }
        // DC and Nyquist of a real signal
        buf_l[0].im = 0.0;
        buf_r[0].im = 0.0;
        buf_l[pad].im = 0.0;
        buf_r[pad].im = 0.0;

        plan.ifft.process(&mut buf_l);
        plan.ifft.process(&mut buf_r);

        let start = fr * hop;
        for i in 0..n_fft {
            let w = plan.window[i];
            left[start + i] += buf_l[i].re * scale * w;
            right[start + i] += buf_r[i].re * scale * w;
            norm[start + i] += w * w;
        }
    }

    for ((l, r), n) in left.iter_mut().zip(right.iter_mut()).zip(&norm) {
        if *n > 1e-10 {
            *l /= n;
            *r /= n;
        }
    }

    left.truncate(pad + target_len);
    right.truncate(pad + target_len);
    (left.split_off(pad), right.split_off(pad))
}
