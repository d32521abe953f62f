//! Error types for the detection core
//!
//! Every rejection here is recoverable: the detection loop logs it (at most at
//! debug level for the silence cases) and moves on to the next frame.

use std::fmt;
use thiserror::Error;

/// Why a frame was judged to carry no usable pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The signal gate found the frame too quiet.
    Silence,
    /// The strongest in-band bin is below the noise floor.
    NoiseFloor,
    /// No bin qualified as a local peak.
    NoPeak,
    /// The interpolated peak landed outside the search band.
    OutOfBand,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::Silence => "signal below gate threshold",
            Rejection::NoiseFloor => "spectrum below noise floor",
            Rejection::NoPeak => "no spectral peak found",
            Rejection::OutOfBand => "peak outside frequency band",
        };
        f.write_str(reason)
    }
}

/// Outcomes of a detection pass that did not produce a note.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("frame contains no samples")]
    EmptyInput,

    #[error("frame of {0} samples is too short to analyse")]
    FrameTooShort(usize),

    #[error("no usable signal: {0}")]
    BelowThreshold(Rejection),

    #[error("spectral transform failed: {0}")]
    Transform(String),
}

impl DetectError {
    /// True for the expected "nothing is sounding" outcomes.
    pub fn is_below_threshold(&self) -> bool {
        matches!(self, DetectError::BelowThreshold(_))
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
