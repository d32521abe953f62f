//! Audio input capture and device management
//!
//! Handles real-time audio capture from input devices and keeps the most recent
//! window of mono samples in a single shared slot that the detection loop polls.
//! Only the latest window matters for pitch tracking, so nothing is queued.

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Smallest amplification accepted by the capture path.
pub const MIN_AMPLIFICATION: f32 = 0.1;

/// One window of mono samples, nominally in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Frame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Anything the detection loop can poll for the latest frame.
///
/// `None` means no new frame is ready yet; callers retry after a short sleep.
pub trait FrameSource {
    fn latest_frame(&self) -> Option<Frame>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Samples per analysis window.
    pub window_size: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Gain applied to every sample before analysis. Consumer microphones are
    /// often very quiet for soft playing.
    pub amplification: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            sample_rate: 44100,
            channels: 1,
            amplification: 5.0,
        }
    }
}

struct FrameSlot {
    samples: Vec<f32>,
    sample_rate: u32,
    window_size: usize,
    updated: bool,
}

impl FrameSlot {
    fn push_samples(&mut self, new_samples: &[f32]) {
        if self.samples.len() + new_samples.len() > self.window_size {
            let overflow = (self.samples.len() + new_samples.len()) - self.window_size;
            let drained = overflow.min(self.samples.len());
            self.samples.drain(0..drained);
        }

        let skip = new_samples.len().saturating_sub(self.window_size);
        self.samples.extend_from_slice(&new_samples[skip..]);
        self.updated = true;
    }

    fn take_frame(&mut self) -> Option<Frame> {
        if !self.updated || self.samples.len() < self.window_size {
            return None;
        }
        self.updated = false;
        Some(Frame::new(self.samples.clone(), self.sample_rate))
    }
}

/// Shared handle to the most recent window of captured samples.
///
/// The capture callback writes, the detection loop reads; the lock is only
/// held while samples are copied in or out.
#[derive(Clone)]
pub struct FrameBuffer {
    slot: Arc<Mutex<FrameSlot>>,
}

impl FrameBuffer {
    pub fn new(window_size: usize, sample_rate: u32) -> Self {
        Self {
            slot: Arc::new(Mutex::new(FrameSlot {
                samples: Vec::with_capacity(window_size),
                sample_rate,
                window_size,
                updated: false,
            })),
        }
    }

    pub fn push_samples(&self, samples: &[f32]) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.push_samples(samples);
        }
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.sample_rate = sample_rate;
        }
    }
}

impl FrameSource for FrameBuffer {
    fn latest_frame(&self) -> Option<Frame> {
        match self.slot.lock() {
            Ok(mut slot) => slot.take_frame(),
            Err(_) => {
                log::warn!("Frame buffer lock poisoned, skipping frame");
                None
            }
        }
    }
}

/// Averages interleaved channels to mono and applies `amplification`.
pub fn downmix(interleaved: &[f32], channels: usize, amplification: f32) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.iter().map(|&s| s * amplification).collect();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32 * amplification)
        .collect()
}

pub fn clamp_amplification(factor: f32) -> f32 {
    if factor.is_nan() {
        return MIN_AMPLIFICATION;
    }
    factor.max(MIN_AMPLIFICATION)
}

pub struct AudioCapture {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
}

impl AudioCapture {
    pub fn new(buffer: FrameBuffer, config: &CaptureConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

        Self::new_with_device(buffer, device, config)
    }

    pub fn with_device_name(buffer: FrameBuffer, name: &str, config: &CaptureConfig) -> Result<Self> {
        let device = get_input_devices()?
            .into_iter()
            .find(|(device_name, _)| device_name == name)
            .map(|(_, device)| device)
            .ok_or_else(|| anyhow::anyhow!("Input device '{}' not found", name))?;

        Self::new_with_device(buffer, device, config)
    }

    pub fn new_with_device(buffer: FrameBuffer, device: Device, config: &CaptureConfig) -> Result<Self> {
        let supported = device.default_input_config()?;
        let actual_sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let device_name = device.name()?;

        log::info!("Input device: {}", device_name);
        log::debug!("Default input config: {:?}", supported);
        log::info!(
            "Capturing {} channel(s) at {} Hz, amplification {:.1}x",
            channels,
            actual_sample_rate,
            config.amplification
        );
        if actual_sample_rate != config.sample_rate {
            log::warn!(
                "Device runs at {} Hz instead of the configured {} Hz",
                actual_sample_rate,
                config.sample_rate
            );
        }
        if channels != config.channels as usize {
            log::debug!(
                "Device delivers {} channel(s); downmixing to mono",
                channels
            );
        }

        buffer.set_sample_rate(actual_sample_rate);

        let amplification = clamp_amplification(config.amplification);
        let stream_config: StreamConfig = supported.clone().into();
        let stream = match supported.sample_format() {
            SampleFormat::I8 => Self::create_stream::<i8>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::I16 => Self::create_stream::<i16>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::I32 => Self::create_stream::<i32>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::I64 => Self::create_stream::<i64>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::U8 => Self::create_stream::<u8>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::U16 => Self::create_stream::<u16>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::U32 => Self::create_stream::<u32>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::U64 => Self::create_stream::<u64>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::F32 => Self::create_stream::<f32>(&device, &stream_config, buffer, channels, amplification)?,
            SampleFormat::F64 => Self::create_stream::<f64>(&device, &stream_config, buffer, channels, amplification)?,
            _ => return Err(anyhow::anyhow!("Unsupported sample format")),
        };

        stream.play()?;

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate: actual_sample_rate,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn create_stream<T>(
        device: &Device,
        config: &StreamConfig,
        buffer: FrameBuffer,
        channels: usize,
        amplification: f32,
    ) -> Result<Stream>
    where
        T: Sample + cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        let mut converted: Vec<f32> = Vec::new();
        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|&sample| f32::from_sample(sample)));
                buffer.push_samples(&downmix(&converted, channels, amplification));
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?;

        Ok(stream)
    }
}

pub fn get_input_devices() -> Result<Vec<(String, cpal::Device)>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            devices.push((name, device));
        }
    }

    Ok(devices)
}

pub fn get_default_input_device_name() -> Result<String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No default input device"))?;
    Ok(device.name()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_needs_a_full_window() {
        let buffer = FrameBuffer::new(8, 44100);
        buffer.push_samples(&[0.1; 5]);
        assert_eq!(buffer.latest_frame(), None);

        buffer.push_samples(&[0.2; 3]);
        let frame = buffer.latest_frame().unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.sample_rate, 44100);
    }

    #[test]
    fn buffer_keeps_only_most_recent_window() {
        let buffer = FrameBuffer::new(4, 48000);
        buffer.push_samples(&[1.0, 2.0, 3.0]);
        buffer.push_samples(&[4.0, 5.0, 6.0]);
        assert_eq!(buffer.latest_frame().unwrap().samples, vec![3.0, 4.0, 5.0, 6.0]);

        buffer.push_samples(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(buffer.latest_frame().unwrap().samples, vec![9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn frame_is_handed_out_once_per_update() {
        let buffer = FrameBuffer::new(2, 44100);
        buffer.push_samples(&[0.5, 0.5]);
        assert!(buffer.latest_frame().is_some());
        assert!(buffer.latest_frame().is_none());

        buffer.push_samples(&[0.25]);
        assert_eq!(buffer.latest_frame().unwrap().samples, vec![0.5, 0.25]);
    }

    #[test]
    fn sample_rate_follows_device() {
        let buffer = FrameBuffer::new(2, 44100);
        buffer.set_sample_rate(48000);
        buffer.push_samples(&[0.0, 0.0]);
        assert_eq!(buffer.latest_frame().unwrap().sample_rate, 48000);
    }

    #[test]
    fn downmix_averages_channels_and_amplifies() {
        let stereo = [0.2, 0.4, -0.2, -0.4, 0.0, 1.0];
        let mono = downmix(&stereo, 2, 5.0);
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 1.5).abs() < 1e-6);
        assert!((mono[1] + 1.5).abs() < 1e-6);
        assert!((mono[2] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn mono_input_is_only_amplified() {
        assert_eq!(downmix(&[0.1, -0.2], 1, 2.0), vec![0.2, -0.4]);
    }

    #[test]
    fn amplification_has_a_floor() {
        assert_eq!(clamp_amplification(0.0), MIN_AMPLIFICATION);
        assert_eq!(clamp_amplification(-3.0), MIN_AMPLIFICATION);
        assert_eq!(clamp_amplification(7.0), 7.0);
    }
}
