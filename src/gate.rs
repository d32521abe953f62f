//! Signal level measurement and silence gating
//!
//! Runs before the transform so silent frames never pay for an FFT, and so
//! "nothing is sounding" does not depend on spectral artefacts.

use serde::{Deserialize, Serialize};

/// dB reported for frames whose RMS is effectively zero.
pub const SILENCE_DB: f32 = -100.0;
const RMS_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub rms: f32,
    pub peak: f32,
    pub db: f32,
}

impl Level {
    pub const SILENT: Level = Level {
        rms: 0.0,
        peak: 0.0,
        db: SILENCE_DB,
    };
}

pub fn measure_level(samples: &[f32]) -> Level {
    if samples.is_empty() {
        return Level::SILENT;
    }

    let mut sum_squares = 0.0f64;
    let mut peak = 0.0f32;
    for &sample in samples {
        sum_squares += sample as f64 * sample as f64;
        peak = peak.max(sample.abs());
    }
    let rms = (sum_squares / samples.len() as f64).sqrt();

    let db = if rms > RMS_EPSILON {
        (20.0 * rms.log10()) as f32
    } else {
        SILENCE_DB
    };

    Level {
        rms: rms as f32,
        peak,
        db,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum RMS for a frame to be analysed.
    pub volume_threshold: f32,
    /// Frames quieter than this (dB) are treated as silence.
    pub silence_db_floor: f32,
    /// Shorter frames are skipped without touching the tracked note.
    pub min_frame_len: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 0.005,
            silence_db_floor: -40.0,
            min_frame_len: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub passes: bool,
    pub level: Level,
}

impl GateDecision {
    pub fn rms(&self) -> f32 {
        self.level.rms
    }

    pub fn db(&self) -> f32 {
        self.level.db
    }
}

#[derive(Debug, Clone)]
pub struct SignalGate {
    config: GateConfig,
}

impl SignalGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn evaluate(&self, samples: &[f32]) -> GateDecision {
        let level = measure_level(samples);
        let too_quiet = level.rms < self.config.volume_threshold
            || level.db < self.config.silence_db_floor
            // a lone click in an otherwise quiet frame
            || level.peak < self.config.volume_threshold * 2.0;

        GateDecision {
            passes: !samples.is_empty() && !too_quiet,
            level,
        }
    }
}
