//! Tuner settings
//!
//! Every section has defaults, so a settings file only needs the keys it
//! changes. Command line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::CaptureConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::gate::GateConfig;
use crate::peaks::PeakConfig;
use crate::stability::StabilityConfig;
use crate::tuner::TimingConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub capture: CaptureConfig,
    pub peaks: PeakConfig,
    pub gate: GateConfig,
    pub stability: StabilityConfig,
    pub timing: TimingConfig,
}

impl TunerConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: TunerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let capture = &self.capture;
        if capture.window_size < 2 {
            return invalid(format!("window_size must be at least 2, got {}", capture.window_size));
        }
        if capture.sample_rate == 0 {
            return invalid("sample_rate must be positive".to_string());
        }
        if capture.channels == 0 {
            return invalid("channels must be positive".to_string());
        }
        if !(capture.amplification > 0.0) {
            return invalid(format!("amplification must be positive, got {}", capture.amplification));
        }

        let peaks = &self.peaks;
        if !(peaks.min_frequency > 0.0 && peaks.min_frequency < peaks.max_frequency) {
            return invalid(format!(
                "frequency band {}..{} Hz is empty",
                peaks.min_frequency, peaks.max_frequency
            ));
        }
        if !(0.0..=1.0).contains(&peaks.peak_threshold) {
            return invalid(format!("peak_threshold must be within 0..=1, got {}", peaks.peak_threshold));
        }
        if peaks.noise_floor < 0.0 {
            return invalid(format!("noise_floor must not be negative, got {}", peaks.noise_floor));
        }

        if self.gate.volume_threshold < 0.0 {
            return invalid(format!(
                "volume_threshold must not be negative, got {}",
                self.gate.volume_threshold
            ));
        }

        if self.gate.min_frame_len < 2 || self.gate.min_frame_len > capture.window_size {
            return invalid(format!(
                "min_frame_len must be within 2..={}, got {}",
                capture.window_size, self.gate.min_frame_len
            ));
        }

        if self.stability.onset_jump_db <= 0.0 {
            return invalid(format!(
                "onset_jump_db must be positive, got {}",
                self.stability.onset_jump_db
            ));
        }

        Ok(())
    }
}

fn invalid(message: String) -> ConfigResult<()> {
    Err(ConfigError::InvalidParameter(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = TunerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.window_size, 4096);
        assert_eq!(config.capture.amplification, 5.0);
        assert_eq!(config.gate.silence_db_floor, -40.0);
        assert_eq!(config.gate.min_frame_len, 512);
        assert!(config.timing.idle_poll_ms > config.timing.tracking_poll_ms);
        assert_eq!(config.stability.stabilization_delay_ms, 300);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config: TunerConfig =
            serde_json::from_str(r#"{ "peaks": { "max_frequency": 2000.0 }, "gate": { "silence_db_floor": -50.0 } }"#)
                .unwrap();
        assert_eq!(config.peaks.max_frequency, 2000.0);
        assert_eq!(config.peaks.min_frequency, 80.0);
        assert_eq!(config.gate.silence_db_floor, -50.0);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn json_round_trip_preserves_settings() {
        let mut config = TunerConfig::default();
        config.peaks.fallback_frequency = Some(440.0);
        config.stability.report_levels = false;
        let parsed: TunerConfig = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_inverted_band() {
        let mut config = TunerConfig::default();
        config.peaks.min_frequency = 1500.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidParameter(_))));
    }

    #[test]
    fn rejects_tiny_window_and_zero_amplification() {
        let mut config = TunerConfig::default();
        config.capture.window_size = 1;
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.capture.amplification = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_min_frame_len_above_window() {
        let mut config = TunerConfig::default();
        config.gate.min_frame_len = 8192;
        assert!(config.validate().is_err());
        config.capture.window_size = 8192;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = TunerConfig::default();
        config.peaks.peak_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file_and_reports_errors() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("notewatch-config-{}.json", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            write!(file, r#"{{ "capture": {{ "window_size": 8192 }} }}"#).unwrap();
        }
        let config = TunerConfig::load(&path).unwrap();
        assert_eq!(config.capture.window_size, 8192);

        fs::write(&path, "not json").unwrap();
        assert!(matches!(TunerConfig::load(&path), Err(ConfigError::Json(_))));
        fs::remove_file(&path).unwrap();

        assert!(matches!(TunerConfig::load(&path), Err(ConfigError::Io(_))));
    }
}
