//! Application entry point for Notewatch
//!
//! Loads settings, starts audio capture and the detection thread, then runs
//! the tuner window until it is closed.

use clap::Parser;
use eframe::egui;
use std::path::PathBuf;

mod display;

use display::TunerDisplay;
use notewatch::audio::{clamp_amplification, get_default_input_device_name, get_input_devices, AudioCapture};
use notewatch::{DetectionWorker, FftPitchDetector, FrameBuffer, Tuner, TunerConfig};

/// Show the note being played on the default (or chosen) input device
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON settings file; missing keys keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input device name (see --list-devices)
    #[arg(short, long)]
    device: Option<String>,

    /// Print the available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Input gain applied before analysis
    #[arg(short, long)]
    amplification: Option<f32>,

    /// Samples per analysis frame
    #[arg(short, long)]
    window_size: Option<usize>,

    /// Frames quieter than this (dB) count as silence
    #[arg(long, allow_hyphen_values = true)]
    silence_floor: Option<f32>,

    /// Do not send level readings to the display
    #[arg(long)]
    quiet_levels: bool,
}

impl Args {
    fn to_config(&self) -> Result<TunerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => TunerConfig::load(path)?,
            None => TunerConfig::default(),
        };

        if let Some(amplification) = self.amplification {
            config.capture.amplification = amplification;
        }
        if let Some(window_size) = self.window_size {
            config.capture.window_size = window_size;
        }
        if let Some(floor) = self.silence_floor {
            config.gate.silence_db_floor = floor;
        }
        if self.quiet_levels {
            config.stability.report_levels = false;
        }
        config.capture.amplification = clamp_amplification(config.capture.amplification);

        config.validate()?;
        Ok(config)
    }
}

fn list_devices() -> anyhow::Result<()> {
    let default_name = get_default_input_device_name().ok();
    for (name, _) in get_input_devices()? {
        let marker = if Some(&name) == default_name.as_ref() { " (default)" } else { "" };
        println!("{}{}", name, marker);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    if args.list_devices {
        list_devices()?;
        return Ok(());
    }

    let config = args.to_config()?;
    log::debug!("Settings: {:?}", config);

    let buffer = FrameBuffer::new(config.capture.window_size, config.capture.sample_rate);
    let audio_capture = match &args.device {
        Some(name) => AudioCapture::with_device_name(buffer.clone(), name, &config.capture)?,
        None => AudioCapture::new(buffer.clone(), &config.capture)?,
    };
    log::info!(
        "Listening on '{}' at {} Hz",
        audio_capture.device_name(),
        audio_capture.sample_rate()
    );

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let detector = FftPitchDetector::new(config.capture.window_size, config.peaks.clone());
    let worker = DetectionWorker::spawn(buffer.clone(), Tuner::new(&config, detector), events_tx)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([320.0, 180.0])
            .with_resizable(false)
            .with_always_on_top()
            .with_decorations(true)
            .with_title_shown(false)
            .with_titlebar_buttons_shown(true)
            .with_titlebar_shown(false)
            .with_fullsize_content_view(true)
            .with_transparent(true),
        ..Default::default()
    };

    let capture_config = config.capture.clone();
    let result = eframe::run_native(
        "Notewatch",
        options,
        Box::new(move |_cc| {
            let mut app = TunerDisplay::new(events_rx, buffer, capture_config);
            app.set_audio_capture(audio_capture);
            Ok(Box::new(app))
        }),
    );

    worker.stop();
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "notewatch",
            "--amplification",
            "2.5",
            "--window-size",
            "8192",
            "--silence-floor",
            "-50",
            "--quiet-levels",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.capture.amplification, 2.5);
        assert_eq!(config.capture.window_size, 8192);
        assert_eq!(config.gate.silence_db_floor, -50.0);
        assert!(!config.stability.report_levels);
    }

    #[test]
    fn tiny_amplification_is_clamped() {
        let args = Args::parse_from(["notewatch", "--amplification", "0.01"]);
        let config = args.to_config().unwrap();
        assert_eq!(config.capture.amplification, 0.1);
    }

    #[test]
    fn invalid_window_size_is_rejected() {
        let args = Args::parse_from(["notewatch", "--window-size", "1"]);
        assert!(args.to_config().is_err());
    }
}
