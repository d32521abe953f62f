//! Pitch detection and musical note conversion
//!
//! Implements FFT-based pitch detection: Hann window, magnitude spectrum, peak
//! picking with parabolic refinement, then note mapping. Silence gating happens
//! before a frame reaches a detector.

use crate::audio::Frame;
use crate::error::{DetectError, Rejection};
use crate::note::{frequency_to_note, Note};
use crate::peaks::{find_peaks, PeakConfig, PeakSearch};
use crate::spectrum::SpectralEstimator;

/// Turns one frame into a note, or says why it could not.
pub trait PitchDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Note, DetectError>;
}

pub struct FftPitchDetector {
    estimator: SpectralEstimator,
    config: PeakConfig,
}

impl FftPitchDetector {
    pub fn new(window_size: usize, config: PeakConfig) -> Self {
        Self {
            estimator: SpectralEstimator::new(window_size),
            config,
        }
    }

    pub fn config(&self) -> &PeakConfig {
        &self.config
    }

    /// Frequency of the strongest in-band peak.
    pub fn detect_frequency(&mut self, frame: &Frame) -> Result<f32, DetectError> {
        if frame.is_empty() {
            return Err(DetectError::EmptyInput);
        }

        let spectrum = self.estimator.estimate(&frame.samples, frame.sample_rate)?;

        let rejection = match find_peaks(&spectrum, &self.config) {
            PeakSearch::Found(peaks) => {
                let frequency = peaks[0].frequency;
                if frequency < self.config.min_frequency || frequency > self.config.max_frequency {
                    log::trace!("Peak at {:.1} Hz is outside the search band", frequency);
                    return Err(DetectError::BelowThreshold(Rejection::OutOfBand));
                }
                return Ok(frequency);
            }
            PeakSearch::BelowNoiseFloor => Rejection::NoiseFloor,
            PeakSearch::NoPeak => Rejection::NoPeak,
        };

        match self.config.fallback_frequency {
            Some(frequency) if frequency > 0.0 => {
                log::trace!("{}; reporting fallback {:.1} Hz", rejection, frequency);
                Ok(frequency)
            }
            _ => Err(DetectError::BelowThreshold(rejection)),
        }
    }
}

impl PitchDetector for FftPitchDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Note, DetectError> {
        self.detect_frequency(frame).map(frequency_to_note)
    }
}

/// Always reports the same pitch for non-empty frames. Useful for exercising
/// the stability logic without real audio.
#[derive(Debug, Clone)]
pub struct FixedPitchDetector {
    frequency: f32,
}

impl FixedPitchDetector {
    pub fn new(frequency: f32) -> Self {
        Self { frequency }
    }
}

impl Default for FixedPitchDetector {
    fn default() -> Self {
        Self::new(crate::note::A4_FREQUENCY)
    }
}

impl PitchDetector for FixedPitchDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Note, DetectError> {
        if frame.is_empty() {
            return Err(DetectError::EmptyInput);
        }
        Ok(frequency_to_note(self.frequency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, rms: f32) -> Frame {
        let amplitude = rms * std::f32::consts::SQRT_2;
        let samples = (0..4096)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin())
            .collect();
        Frame::new(samples, 44100)
    }

    #[test]
    fn detects_a440() {
        let mut detector = FftPitchDetector::new(4096, PeakConfig::default());
        let note = detector.detect(&tone(440.0, 0.1)).unwrap();
        assert_eq!(note.name, "A");
        assert_eq!(note.octave, 4);
        assert!(note.cents.abs() < 5.0, "cents {}", note.cents);
    }

    #[test]
    fn detects_guitar_strings() {
        let mut detector = FftPitchDetector::new(4096, PeakConfig::default());
        for (freq, name, octave) in [(110.0, "A", 2), (146.83, "D", 3), (196.0, "G", 3), (329.63, "E", 4)] {
            let note = detector.detect(&tone(freq, 0.1)).unwrap();
            assert_eq!((note.name, note.octave), (name, octave), "{} Hz", freq);
        }
    }

    #[test]
    fn same_frame_gives_same_note() {
        let frame = tone(466.16, 0.1);
        let mut detector = FftPitchDetector::new(4096, PeakConfig::default());
        let first = detector.detect(&frame).unwrap();
        let second = detector.detect(&frame).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.name, "A#");
    }

    #[test]
    fn empty_frame_is_rejected() {
        let mut detector = FftPitchDetector::new(4096, PeakConfig::default());
        assert_eq!(
            detector.detect(&Frame::new(Vec::new(), 44100)),
            Err(DetectError::EmptyInput)
        );
    }

    #[test]
    fn silent_frame_is_below_threshold() {
        let mut detector = FftPitchDetector::new(4096, PeakConfig::default());
        let result = detector.detect(&Frame::new(vec![0.0; 4096], 44100));
        assert_eq!(result, Err(DetectError::BelowThreshold(Rejection::NoiseFloor)));
    }

    #[test]
    fn fallback_frequency_replaces_rejection() {
        let config = PeakConfig {
            fallback_frequency: Some(440.0),
            ..PeakConfig::default()
        };
        let mut detector = FftPitchDetector::new(4096, config);
        let note = detector.detect(&Frame::new(vec![0.0; 4096], 44100)).unwrap();
        assert_eq!((note.name, note.octave), ("A", 4));
    }

    #[test]
    fn tone_above_band_is_not_reported_as_note() {
        let mut detector = FftPitchDetector::new(4096, PeakConfig::default());
        let result = detector.detect(&tone(3000.0, 0.1));
        assert!(result.is_err());
        assert!(result.unwrap_err().is_below_threshold());
    }

    #[test]
    fn fixed_detector_ignores_content() {
        let mut detector = FixedPitchDetector::new(261.63);
        let note = detector.detect(&Frame::new(vec![0.0; 16], 44100)).unwrap();
        assert_eq!((note.name, note.octave), ("C", 4));
        assert!(detector.detect(&Frame::new(Vec::new(), 44100)).is_err());
    }
}
