//! Hann windowing for spectral analysis
//!
//! Tapers a frame towards zero at both ends to reduce spectral leakage before
//! the transform. Frames always have more than one sample by the time they get
//! here; the detector rejects shorter ones.

use std::f32::consts::PI;

/// Hann coefficients `0.5 * (1 - cos(2πi/(N-1)))` for a window of `len` samples.
pub fn hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let n_minus_1 = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Multiplies `samples` by precomputed coefficients into `out`.
pub fn apply_window_into(samples: &[f32], window: &[f32], out: &mut [f32]) {
    for ((dst, &sample), &coeff) in out.iter_mut().zip(samples).zip(window) {
        *dst = sample * coeff;
    }
}

pub fn apply_hann_window(samples: &[f32]) -> Vec<f32> {
    let window = hann_window(samples.len());
    let mut out = vec![0.0; samples.len()];
    apply_window_into(samples, &window, &mut out);
    out
}
