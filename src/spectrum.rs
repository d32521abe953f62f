//! Magnitude spectrum estimation
//!
//! Runs a real-input FFT over a windowed frame. The real transform returns bins
//! `0..=N/2` of the full complex DFT of the frame promoted with a zero imaginary
//! part, so bin `k` sits at `k * sample_rate / N` Hz.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::error::DetectError;
use crate::window::{apply_window_into, hann_window};

/// Magnitudes of one frame's spectrum, up to and including Nyquist.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
    sample_rate: u32,
    fft_size: usize,
}

impl Spectrum {
    pub fn new(magnitudes: Vec<f32>, sample_rate: u32, fft_size: usize) -> Self {
        Self {
            magnitudes,
            sample_rate,
            fft_size,
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Width of one bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    pub fn bin_frequency(&self, bin: f32) -> f32 {
        bin * self.bin_hz()
    }
}

/// Windowed FFT with buffers reused across frames.
pub struct SpectralEstimator {
    planner: RealFftPlanner<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
}

impl SpectralEstimator {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();

        Self {
            planner,
            fft,
            window: hann_window(fft_size),
            input,
            output,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Replans when a frame of a different length arrives.
    fn ensure_size(&mut self, fft_size: usize) {
        if self.window.len() == fft_size {
            return;
        }
        log::debug!("Replanning FFT for {} samples", fft_size);
        self.fft = self.planner.plan_fft_forward(fft_size);
        self.input = self.fft.make_input_vec();
        self.output = self.fft.make_output_vec();
        self.window = hann_window(fft_size);
    }

    /// Windows `samples`, transforms them and returns per-bin magnitudes.
    pub fn estimate(&mut self, samples: &[f32], sample_rate: u32) -> Result<Spectrum, DetectError> {
        if samples.is_empty() {
            return Err(DetectError::EmptyInput);
        }
        if samples.len() < 2 {
            return Err(DetectError::FrameTooShort(samples.len()));
        }

        self.ensure_size(samples.len());
        apply_window_into(samples, &self.window, &mut self.input);

        self.fft
            .process(&mut self.input, &mut self.output)
            .map_err(|e| DetectError::Transform(e.to_string()))?;

        let magnitudes = self.output.iter().map(|c| c.norm()).collect();
        Ok(Spectrum::new(magnitudes, sample_rate, samples.len()))
    }
}
