// Error types for the shot timer engine
//
// This module defines custom error types for audio and calibration operations,
// providing structured error handling with numeric error codes for the
// display layer.

use log::error;
use std::fmt;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the engine boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Log an audio error with structured context
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=Capture, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover frame acquisition: device discovery, stream
/// management, and clip decoding. The detection core is never entered
/// without a valid frame source, so all of these surface before or
/// between sessions.
///
/// Error code ranges: 1001-1006
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// No input device available, or permission denied
    InputUnavailable { details: String },

    /// Failed to open the capture stream
    StreamOpenFailed { reason: String },

    /// Capture stream is already running
    AlreadyRunning,

    /// Capture stream is not running
    NotRunning,

    /// A frame had the wrong length for the configured frame size
    FrameSizeMismatch { expected: usize, got: usize },

    /// Failed to decode a pre-recorded clip
    ClipDecodeFailed { reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::InputUnavailable { .. } => 1001,
            AudioError::StreamOpenFailed { .. } => 1002,
            AudioError::AlreadyRunning => 1003,
            AudioError::NotRunning => 1004,
            AudioError::FrameSizeMismatch { .. } => 1005,
            AudioError::ClipDecodeFailed { .. } => 1006,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::InputUnavailable { details } => {
                format!("Audio input unavailable: {}", details)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::AlreadyRunning => {
                "Capture already running. Call stop() first.".to_string()
            }
            AudioError::NotRunning => "Capture not running. Call start() first.".to_string(),
            AudioError::FrameSizeMismatch { expected, got } => {
                format!("Frame size mismatch: expected {}, got {}", expected, got)
            }
            AudioError::ClipDecodeFailed { reason } => {
                format!("Failed to decode clip: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::InputUnavailable {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        AudioError::ClipDecodeFailed {
            reason: err.to_string(),
        }
    }
}

/// Calibration-related errors
///
/// Calibration non-convergence is not an error (it is an indefinite
/// pending state); these cover misuse of the procedure itself.
///
/// Error code ranges: 2001-2003
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Fewer reference shots captured than required for finalization
    InsufficientShots { required: usize, collected: usize },

    /// Calibration already in progress
    AlreadyInProgress,

    /// No calibration in progress
    NotInProgress,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InsufficientShots { .. } => 2001,
            CalibrationError::AlreadyInProgress => 2002,
            CalibrationError::NotInProgress => 2003,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InsufficientShots {
                required,
                collected,
            } => {
                format!(
                    "Insufficient reference shots: need {}, got {}",
                    required, collected
                )
            }
            CalibrationError::AlreadyInProgress => "Calibration already in progress".to_string(),
            CalibrationError::NotInProgress => "No calibration in progress".to_string(),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError (code {}): {}",
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
