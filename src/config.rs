//! Configuration for the detection core and session timer
//!
//! This module provides typed, validated configuration with runtime loading
//! from JSON files. Out-of-range values are clamped to their bounds rather
//! than rejected, so a malformed user input never stops a session; invalid
//! files fall back to defaults with a warning.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// User sensitivity bounds
pub const SENSITIVITY_MIN: f32 = 0.0;
pub const SENSITIVITY_MAX: f32 = 1.0;

/// Shot cooldown bounds in milliseconds
pub const SHOT_COOLDOWN_MIN_MS: f64 = 60.0;
pub const SHOT_COOLDOWN_MAX_MS: f64 = 1000.0;

/// Minimum-silence-before-shot bounds in milliseconds
pub const MIN_SILENCE_MIN_MS: f64 = 0.0;
pub const MIN_SILENCE_MAX_MS: f64 = 1000.0;

/// Start-delay bounds in seconds
pub const DELAY_MIN_SECONDS: f64 = 0.5;
pub const DELAY_MAX_SECONDS: f64 = 10.0;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub threshold: ThresholdConfig,
    pub timer: TimerConfig,
    pub calibration: CalibrationConfig,
}

/// Audio frame parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frame size in samples (power of two)
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            frame_size: 2048,
        }
    }
}

impl AudioConfig {
    /// Duration of one frame in milliseconds
    pub fn frame_duration_ms(&self) -> f64 {
        self.frame_size as f64 / self.sample_rate as f64 * 1000.0
    }
}

/// Detection threshold parameters (user-adjustable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// User-facing sensitivity in [0, 1]; higher means easier to trigger
    pub sensitivity: f32,
    /// Minimum time after a registered shot before another may register
    pub shot_cooldown_ms: f64,
    /// Minimum time below threshold before the strict (non-impulse) path
    /// may register a new shot
    pub min_silence_before_shot_ms: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            shot_cooldown_ms: 160.0,
            min_silence_before_shot_ms: 120.0,
        }
    }
}

impl ThresholdConfig {
    /// Return a copy with every field clamped to its bounds.
    ///
    /// This is the only path by which user values reach the detector, so
    /// the cooldown/silence invariants hold after any commit.
    pub fn clamped(&self) -> Self {
        Self {
            sensitivity: self.sensitivity.clamp(SENSITIVITY_MIN, SENSITIVITY_MAX),
            shot_cooldown_ms: self
                .shot_cooldown_ms
                .clamp(SHOT_COOLDOWN_MIN_MS, SHOT_COOLDOWN_MAX_MS),
            min_silence_before_shot_ms: self
                .min_silence_before_shot_ms
                .clamp(MIN_SILENCE_MIN_MS, MIN_SILENCE_MAX_MS),
        }
    }
}

/// Start-delay mode for the session timer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartDelay {
    /// Fixed delay in seconds
    Fixed { seconds: f64 },
    /// Uniform random delay in [min_seconds, max_seconds]
    Random { min_seconds: f64, max_seconds: f64 },
}

impl StartDelay {
    /// Clamp delay bounds to [DELAY_MIN_SECONDS, DELAY_MAX_SECONDS] and
    /// ensure min <= max.
    pub fn clamped(&self) -> Self {
        match *self {
            StartDelay::Fixed { seconds } => StartDelay::Fixed {
                seconds: seconds.clamp(DELAY_MIN_SECONDS, DELAY_MAX_SECONDS),
            },
            StartDelay::Random {
                min_seconds,
                max_seconds,
            } => {
                let min = min_seconds.clamp(DELAY_MIN_SECONDS, DELAY_MAX_SECONDS);
                let max = max_seconds.clamp(min, DELAY_MAX_SECONDS);
                StartDelay::Random {
                    min_seconds: min,
                    max_seconds: max,
                }
            }
        }
    }
}

/// Session timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Delay between pressing start and the beep
    pub start_delay: StartDelay,
    /// Optional secondary ("par") beep, seconds after the start beep
    pub par_time_seconds: Option<f64>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            start_delay: StartDelay::Random {
                min_seconds: 1.0,
                max_seconds: 3.0,
            },
            par_time_seconds: None,
        }
    }
}

/// Calibration procedure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Reference shots required before finalization
    pub shots_required: usize,
    /// Peak-capture window after a threshold crossing, in milliseconds
    pub peak_window_ms: f64,
    /// Buffer factor applied to observed peaks when deriving a threshold
    pub peak_buffer: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            shots_required: 4,
            peak_window_ms: 160.0,
            peak_buffer: 0.9,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            threshold: ThresholdConfig::default(),
            timer: TimerConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing or invalid files fall back to defaults with a warning;
    /// loaded values are clamped to their bounds.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        };
        config.clamped()
    }

    /// Return a copy with all bounded fields clamped.
    pub fn clamped(&self) -> Self {
        Self {
            audio: self.audio.clone(),
            threshold: self.threshold.clamped(),
            timer: TimerConfig {
                start_delay: self.timer.start_delay.clamped(),
                par_time_seconds: self.timer.par_time_seconds.map(|s| s.max(0.0)),
            },
            calibration: self.calibration.clone(),
        }
    }
}
