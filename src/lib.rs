//! Real-time note detection
//!
//! Turns a stream of mono audio frames into a stream of musical note events:
//! windowed FFT, peak picking with parabolic refinement, note mapping, a
//! silence gate and an onset/stability state machine that keeps the reported
//! note from flickering. Capture and presentation sit behind small seams
//! ([`audio::FrameSource`] and a channel of [`TunerEvent`]s).

pub mod audio;
pub mod config;
pub mod error;
pub mod gate;
pub mod note;
pub mod peaks;
pub mod pitch;
pub mod spectrum;
pub mod stability;
pub mod tuner;
pub mod window;

pub use audio::{Frame, FrameBuffer, FrameSource};
pub use config::TunerConfig;
pub use error::{ConfigError, DetectError, Rejection};
pub use note::{frequency_to_note, Note};
pub use pitch::{FftPitchDetector, FixedPitchDetector, PitchDetector};
pub use tuner::{run_detection_loop, DetectionWorker, Phase, Tuner, TunerEvent};
