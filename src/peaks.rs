//! Spectral peak extraction
//!
//! Finds local maxima inside a frequency band and refines each one with
//! parabolic interpolation across the three bins around it. Restricting the
//! band and requiring peaks to clear a fraction of the in-band maximum keeps
//! hum, DC and hiss from winning over the played note.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::spectrum::Spectrum;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub bin: usize,
    /// Interpolated frequency in Hz.
    pub frequency: f32,
    pub magnitude: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Lowest frequency searched (Hz). E2 on guitar is ~82 Hz.
    pub min_frequency: f32,
    /// Highest frequency searched (Hz).
    pub max_frequency: f32,
    /// Absolute magnitude the strongest in-band bin must reach.
    pub noise_floor: f32,
    /// Fraction of the in-band maximum a local maximum must exceed.
    pub peak_threshold: f32,
    /// Frequency reported when no peak qualifies. `None` rejects the frame.
    pub fallback_frequency: Option<f32>,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_frequency: 80.0,
            max_frequency: 1200.0,
            noise_floor: 0.01,
            peak_threshold: 0.2,
            fallback_frequency: None,
        }
    }
}

/// Result of searching one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub enum PeakSearch {
    /// Candidates ranked by magnitude, strongest first.
    Found(Vec<Peak>),
    BelowNoiseFloor,
    NoPeak,
}

impl PeakSearch {
    pub fn strongest(&self) -> Option<Peak> {
        match self {
            PeakSearch::Found(peaks) => peaks.first().copied(),
            _ => None,
        }
    }
}

/// Inclusive bin range covering the band, never touching DC or Nyquist.
pub fn band_bins(spectrum: &Spectrum, config: &PeakConfig) -> (usize, usize) {
    let bin_hz = spectrum.bin_hz();
    let min_bin = ((config.min_frequency / bin_hz) as usize).max(1);
    let max_bin = ((config.max_frequency / bin_hz) as usize).min(spectrum.fft_size() / 2 - 1);
    (min_bin, max_bin)
}

/// Sub-bin offset of the vertex of the parabola through three magnitudes.
/// `None` when the three points are collinear.
pub fn parabolic_offset(prev: f32, current: f32, next: f32) -> Option<f32> {
    let denominator = prev - 2.0 * current + next;
    if denominator == 0.0 {
        return None;
    }
    Some(0.5 * (prev - next) / denominator)
}

pub fn find_peaks(spectrum: &Spectrum, config: &PeakConfig) -> PeakSearch {
    let magnitudes = spectrum.magnitudes();
    if spectrum.fft_size() < 4 || magnitudes.len() < spectrum.fft_size() / 2 {
        return PeakSearch::NoPeak;
    }

    let (min_bin, max_bin) = band_bins(spectrum, config);
    if min_bin >= max_bin {
        return PeakSearch::NoPeak;
    }

    let max_magnitude = magnitudes[min_bin..=max_bin]
        .iter()
        .copied()
        .fold(0.0f32, f32::max);

    if max_magnitude < config.noise_floor {
        return PeakSearch::BelowNoiseFloor;
    }

    let threshold = max_magnitude * config.peak_threshold;
    let mut peaks = Vec::new();

    for i in (min_bin + 1)..max_bin {
        let prev = magnitudes[i - 1];
        let current = magnitudes[i];
        let next = magnitudes[i + 1];

        if current > prev && current > next && current > threshold {
            let refined_bin = match parabolic_offset(prev, current, next) {
                Some(delta) => i as f32 + delta,
                None => i as f32,
            };
            peaks.push(Peak {
                bin: i,
                frequency: spectrum.bin_frequency(refined_bin),
                magnitude: current,
            });
        }
    }

    if peaks.is_empty() {
        return PeakSearch::NoPeak;
    }

    // Stable sort keeps the lower bin first among equal magnitudes.
    peaks.sort_by(|a, b| {
        b.magnitude
            .partial_cmp(&a.magnitude)
            .unwrap_or(Ordering::Equal)
    });

    PeakSearch::Found(peaks)
}
