// Calibration procedure - reference-shot peak capture
//
// Entered by explicit user action. Each qualifying threshold crossing
// opens a short peak-capture window; when the window closes, the maximum
// normalized level observed becomes that shot's peak and a threshold just
// below it is applied immediately, so the live threshold line reflects
// the latest calibration shot. After the required number of shots, the
// final threshold is derived from the mean peak.
//
// If the user never produces enough qualifying crossings the procedure
// stays pending forever; cancellation is the engine's responsibility.

use log::{debug, info};

use crate::analysis::threshold::{MAX_THRESHOLD, MIN_THRESHOLD};

/// Progress information for the current calibration run
#[derive(Debug, Clone, Copy)]
pub struct CalibrationProgress {
    /// Reference shots captured so far
    pub shots_collected: usize,
    /// Total shots needed
    pub shots_required: usize,
}

impl CalibrationProgress {
    pub fn is_complete(&self) -> bool {
        self.shots_collected >= self.shots_required
    }
}

/// Open peak-capture window for one candidate shot
#[derive(Debug, Clone, Copy)]
struct PeakCapture {
    started_at_ms: f64,
    peak: f32,
}

/// Outcome of one calibration tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationTick {
    /// Nothing happening; waiting for a crossing
    Idle,
    /// A capture window is open and tracking the peak
    Capturing { peak: f32 },
    /// A capture window closed; apply `target_threshold` now
    ShotCaptured { peak: f32, target_threshold: f32 },
    /// All shots captured; apply `final_threshold` and stop
    Complete { final_threshold: f32 },
}

/// CalibrationProcedure drives the per-tick sample collection workflow
pub struct CalibrationProcedure {
    /// Peaks of finalized captures, in order
    peaks: Vec<f32>,
    /// Edge flag for crossing detection
    was_above_threshold: bool,
    /// Open capture window, if any
    capture: Option<PeakCapture>,
    /// When the last capture finalized (cooldown reference)
    last_finalized_at_ms: f64,
    shots_required: usize,
    peak_window_ms: f64,
    peak_buffer: f32,
    cooldown_ms: f64,
}

impl CalibrationProcedure {
    /// # Arguments
    /// * `shots_required` - reference shots to capture (typically 4)
    /// * `peak_window_ms` - capture window length after a crossing
    /// * `peak_buffer` - factor applied to peaks when deriving thresholds
    /// * `cooldown_ms` - minimum gap between finalized captures
    pub fn new(shots_required: usize, peak_window_ms: f64, peak_buffer: f32, cooldown_ms: f64) -> Self {
        Self {
            peaks: Vec::with_capacity(shots_required),
            was_above_threshold: false,
            capture: None,
            last_finalized_at_ms: f64::NEG_INFINITY,
            shots_required,
            peak_window_ms,
            peak_buffer,
            cooldown_ms,
        }
    }

    /// Derive a threshold just below a peak (or mean peak).
    fn threshold_for_peak(&self, peak: f32) -> f32 {
        (peak * self.peak_buffer).clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }

    /// Process one tick of normalized level against the live threshold.
    pub fn step(&mut self, normalized_level: f32, threshold: f32, now_ms: f64) -> CalibrationTick {
        let above = normalized_level >= threshold;

        if let Some(capture) = self.capture.as_mut() {
            if normalized_level > capture.peak {
                capture.peak = normalized_level;
            }

            if now_ms - capture.started_at_ms >= self.peak_window_ms {
                let peak = capture.peak;
                self.capture = None;
                self.peaks.push(peak);
                self.last_finalized_at_ms = now_ms;
                self.was_above_threshold = above;

                if self.peaks.len() >= self.shots_required {
                    let mean = self.peaks.iter().sum::<f32>() / self.peaks.len() as f32;
                    let final_threshold = self.threshold_for_peak(mean);
                    info!(
                        "[Calibration] Complete: {} peaks, mean {:.3}, threshold {:.3}",
                        self.peaks.len(),
                        mean,
                        final_threshold
                    );
                    return CalibrationTick::Complete { final_threshold };
                }

                let target_threshold = self.threshold_for_peak(peak);
                debug!(
                    "[Calibration] Shot {}/{}: peak {:.3}, threshold {:.3}",
                    self.peaks.len(),
                    self.shots_required,
                    peak,
                    target_threshold
                );
                return CalibrationTick::ShotCaptured {
                    peak,
                    target_threshold,
                };
            }

            self.was_above_threshold = above;
            return CalibrationTick::Capturing { peak: capture.peak };
        }

        // Rising edge with cooldown elapsed opens a new capture window
        if above
            && !self.was_above_threshold
            && now_ms - self.last_finalized_at_ms >= self.cooldown_ms
        {
            self.capture = Some(PeakCapture {
                started_at_ms: now_ms,
                peak: normalized_level,
            });
            self.was_above_threshold = true;
            return CalibrationTick::Capturing {
                peak: normalized_level,
            };
        }

        self.was_above_threshold = above;
        CalibrationTick::Idle
    }

    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress {
            shots_collected: self.peaks.len(),
            shots_required: self.shots_required,
        }
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    /// Clear all captured state for a fresh run.
    pub fn reset(&mut self) {
        self.peaks.clear();
        self.capture = None;
        self.was_above_threshold = false;
        self.last_finalized_at_ms = f64::NEG_INFINITY;
    }
}
