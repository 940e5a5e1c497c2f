// Session engine - per-tick orchestration of the detection core
//
// Owns every stateful component (level pipeline, threshold model, shot
// detector, beep classifier, session timer, optional calibration run)
// and advances them exactly once per audio frame. Timestamps come in
// from the caller, so the whole engine is deterministic under an
// injected clock.
//
// Start and par beeps are in-core deadlines checked at the top of each
// tick rather than spawned timers; cancellation is a plain state reset
// and tests can step through a session frame by frame.

use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};

use crate::analysis::beep::BeepClassifier;
use crate::analysis::detector::{ShotDetector, TickInput, IMPULSE_WINDOW_SIZE};
use crate::analysis::level::{peak_level, AudioState, PULSE_MS};
use crate::analysis::threshold::{sensitivity_response, ThresholdModel};
use crate::calibration::{CalibrationProcedure, CalibrationTick};
use crate::config::AppConfig;
use crate::error::CalibrationError;
use crate::session::{SessionTimer, Status, BEEP_DURATION_MS};

/// Broadcast channel capacity for engine events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events pushed to subscribers as the session progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StatusChanged(Status),
    ShotRegistered {
        index: usize,
        elapsed_s: f64,
        split_s: Option<f64>,
    },
    CalibrationShotCaptured {
        shots_collected: usize,
        shots_required: usize,
        peak: f32,
    },
    CalibrationComplete {
        threshold: f32,
    },
    ThresholdChanged(f32),
    ParElapsed,
}

/// Snapshot of one engine tick, for the display layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    pub normalized_level: f32,
    pub threshold: f32,
    pub above_threshold: bool,
    pub crossing: bool,
    pub shot: bool,
    /// The start beep fired on this tick
    pub beep_fired: bool,
    /// The par deadline elapsed on this tick
    pub par_fired: bool,
}

pub struct SessionEngine {
    config: AppConfig,
    audio: AudioState,
    threshold: ThresholdModel,
    detector: ShotDetector,
    beep: BeepClassifier,
    timer: SessionTimer,
    calibration: Option<CalibrationProcedure>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl SessionEngine {
    pub fn new(config: AppConfig) -> Self {
        let config = config.clamped();
        let effective = sensitivity_response(config.threshold.sensitivity);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            audio: AudioState::new(),
            threshold: ThresholdModel::new(effective),
            detector: ShotDetector::new(
                config.threshold.shot_cooldown_ms,
                config.threshold.min_silence_before_shot_ms,
            ),
            beep: BeepClassifier::new(config.audio.sample_rate, config.audio.frame_size),
            timer: SessionTimer::new(),
            calibration: None,
            event_tx,
            config,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Watch the live detection threshold.
    pub fn threshold_watch(&self) -> watch::Receiver<f32> {
        self.threshold.subscribe()
    }

    pub fn status(&self) -> &Status {
        self.timer.status()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.threshold()
    }

    pub fn audio_state(&self) -> &AudioState {
        &self.audio
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn set_status(&mut self, status: Status) {
        if *self.timer.status() != status {
            self.timer.set_status(status.clone());
            let _ = self.event_tx.send(EngineEvent::StatusChanged(status));
        }
    }

    /// Mark the session as waiting on microphone permission.
    pub fn request_microphone(&mut self) {
        self.set_status(Status::RequestingMic);
    }

    /// Begin a timed run: clear prior results and schedule the start beep.
    ///
    /// Cancels any calibration in progress.
    pub fn start_timer(&mut self, now_ms: f64) {
        self.calibration = None;
        self.detector.reset();
        self.audio.reset();

        let delay = self.config.timer.start_delay;
        let deadline = self.timer.schedule_start(now_ms, &delay);
        info!(
            "[Engine] Timer started, beep in {:.0}ms",
            deadline - now_ms
        );
        let _ = self
            .event_tx
            .send(EngineEvent::StatusChanged(Status::StandBy));
    }

    /// Cancel any pending beep, disarm detection, and return to idle.
    ///
    /// Clears shots, timing history, and audio state; the next run
    /// starts fresh.
    pub fn reset_timer(&mut self) {
        self.calibration = None;
        self.detector.reset();
        self.audio.reset();
        self.timer.reset();
        let _ = self.event_tx.send(EngineEvent::StatusChanged(Status::Idle));
    }

    /// Enter calibration mode.
    pub fn start_calibration(&mut self) -> Result<(), CalibrationError> {
        if self.calibration.is_some() {
            return Err(CalibrationError::AlreadyInProgress);
        }

        let cal = self.config.calibration.clone();
        self.calibration = Some(CalibrationProcedure::new(
            cal.shots_required,
            cal.peak_window_ms,
            cal.peak_buffer,
            self.config.threshold.shot_cooldown_ms,
        ));
        self.detector.reset();
        self.set_status(Status::Calibrating {
            shots_collected: 0,
            shots_required: cal.shots_required,
        });
        info!("[Engine] Calibration started ({} shots)", cal.shots_required);
        Ok(())
    }

    /// Abandon an in-progress calibration, keeping the prior threshold.
    pub fn cancel_calibration(&mut self) -> Result<(), CalibrationError> {
        if self.calibration.take().is_none() {
            return Err(CalibrationError::NotInProgress);
        }
        self.set_status(Status::Idle);
        info!("[Engine] Calibration cancelled");
        Ok(())
    }

    /// Commit a new sensitivity slider value.
    ///
    /// The raw value is bent through the response curve before it reaches
    /// the threshold map. Edge memory is cleared so a level already above
    /// the new, lower threshold still produces a crossing.
    pub fn set_sensitivity(&mut self, slider: f32) {
        let slider = slider.clamp(0.0, 1.0);
        self.config.threshold.sensitivity = slider;
        self.threshold.set_sensitivity(sensitivity_response(slider));
        self.audio.is_above_threshold = false;
        let _ = self
            .event_tx
            .send(EngineEvent::ThresholdChanged(self.threshold.threshold()));
    }

    /// Commit a new shot cooldown (clamped to bounds).
    pub fn set_shot_cooldown_ms(&mut self, cooldown_ms: f64) {
        self.config.threshold.shot_cooldown_ms = cooldown_ms;
        self.config.threshold = self.config.threshold.clamped();
        self.detector.set_timing(
            self.config.threshold.shot_cooldown_ms,
            self.config.threshold.min_silence_before_shot_ms,
        );
    }

    /// Commit a new minimum-silence window (clamped to bounds).
    pub fn set_min_silence_ms(&mut self, silence_ms: f64) {
        self.config.threshold.min_silence_before_shot_ms = silence_ms;
        self.config.threshold = self.config.threshold.clamped();
        self.detector.set_timing(
            self.config.threshold.shot_cooldown_ms,
            self.config.threshold.min_silence_before_shot_ms,
        );
    }

    /// Process one audio frame at `now_ms`.
    ///
    /// Runs the full pipeline: deadlines, level extraction, calibration
    /// or detection, event emission, and edge-state advance.
    pub fn process_tick(&mut self, frame: &[u8], now_ms: f64) -> TickOutput {
        let threshold = self.threshold.threshold();

        if frame.len() != self.config.audio.frame_size {
            warn!(
                "[Engine] Frame size mismatch: expected {}, got {}; tick skipped",
                self.config.audio.frame_size,
                frame.len()
            );
            return TickOutput {
                normalized_level: self.audio.normalized_level,
                threshold,
                above_threshold: self.audio.is_above_threshold,
                crossing: false,
                shot: false,
                beep_fired: false,
                par_fired: false,
            };
        }

        let mut beep_fired = false;
        let mut par_fired = false;

        if self.timer.start_due(now_ms) {
            let par = self.config.timer.par_time_seconds;
            self.timer.fire_start(now_ms, par);
            self.detector.set_beep_end(now_ms + BEEP_DURATION_MS);
            self.detector.activate();
            beep_fired = true;
            info!("[Engine] BEEP at {:.1}ms", now_ms);
            let _ = self.event_tx.send(EngineEvent::StatusChanged(Status::Beep));
        }

        if self.timer.par_due(now_ms) {
            self.timer.clear_par();
            // The par tone is audible too; extend the beep veto over it
            self.detector.set_beep_end(now_ms + BEEP_DURATION_MS);
            par_fired = true;
            let _ = self.event_tx.send(EngineEvent::ParElapsed);
        }

        let raw = peak_level(frame);
        let normalized = self.audio.update(raw);

        let output = if let Some(mut cal) = self.calibration.take() {
            let tick = cal.step(normalized, threshold, now_ms);
            self.apply_calibration_tick(cal, tick, normalized, threshold)
        } else {
            self.detection_tick(frame, normalized, threshold, now_ms)
        };

        // Edge state advances once per tick, after the decision
        self.audio.is_above_threshold = output.above_threshold;
        self.audio.last_normalized_level = normalized;
        self.audio.push_history();

        TickOutput {
            beep_fired,
            par_fired,
            ..output
        }
    }

    fn detection_tick(
        &mut self,
        frame: &[u8],
        normalized: f32,
        threshold: f32,
        now_ms: f64,
    ) -> TickOutput {
        let above = normalized >= threshold;
        let crossing = above && !self.audio.is_above_threshold;

        // Spectral veto only on crossings inside the post-beep window
        let beep_like = if crossing
            && self
                .beep
                .window_active(self.detector.beep_end_time_ms(), now_ms)
        {
            let verdict = self.beep.classify(frame);
            debug!(
                "[Engine] Crossing in beep window: ratio {:.2}, entropy {:.2}, {:.0}Hz, beep_like={}",
                verdict.dominant_ratio,
                verdict.entropy,
                verdict.dominant_frequency_hz,
                verdict.is_beep_like
            );
            verdict.is_beep_like
        } else {
            false
        };

        let input = TickInput {
            normalized_level: normalized,
            threshold,
            rising_edge: normalized - self.audio.last_normalized_level,
            recent_average: self.audio.recent_average(IMPULSE_WINDOW_SIZE),
            was_above_threshold: self.audio.is_above_threshold,
            beep_like,
            now_ms,
        };
        let decision = self.detector.evaluate(&input);

        if decision.crossing {
            self.audio.crossing_pulse_until = now_ms + PULSE_MS;
        }

        if decision.shot {
            let record = self.timer.register_shot(now_ms);
            self.audio.shot_pulse_until = now_ms + PULSE_MS;
            info!(
                "[Engine] Shot {} at {:.2}s (split {:?})",
                record.index + 1,
                record.elapsed_s,
                record.split_s
            );
            let _ = self.event_tx.send(EngineEvent::ShotRegistered {
                index: record.index,
                elapsed_s: record.elapsed_s,
                split_s: record.split_s,
            });
        }

        TickOutput {
            normalized_level: normalized,
            threshold,
            above_threshold: decision.above_threshold,
            crossing: decision.crossing,
            shot: decision.shot,
            beep_fired: false,
            par_fired: false,
        }
    }

    fn apply_calibration_tick(
        &mut self,
        cal: CalibrationProcedure,
        tick: CalibrationTick,
        normalized: f32,
        threshold: f32,
    ) -> TickOutput {
        let progress = cal.progress();
        self.calibration = Some(cal);

        match tick {
            CalibrationTick::ShotCaptured { peak, target_threshold } => {
                let applied = self.threshold.apply_sensitivity_threshold(target_threshold);
                self.set_status(Status::Calibrating {
                    shots_collected: progress.shots_collected,
                    shots_required: progress.shots_required,
                });
                let _ = self.event_tx.send(EngineEvent::CalibrationShotCaptured {
                    shots_collected: progress.shots_collected,
                    shots_required: progress.shots_required,
                    peak,
                });
                let _ = self.event_tx.send(EngineEvent::ThresholdChanged(applied));
            }
            CalibrationTick::Complete { final_threshold } => {
                let applied = self.threshold.apply_sensitivity_threshold(final_threshold);
                self.config.threshold.sensitivity = self.threshold.sensitivity();
                self.calibration = None;
                self.set_status(Status::Idle);
                let _ = self
                    .event_tx
                    .send(EngineEvent::CalibrationComplete { threshold: applied });
                let _ = self.event_tx.send(EngineEvent::ThresholdChanged(applied));
            }
            CalibrationTick::Idle | CalibrationTick::Capturing { .. } => {}
        }

        let above = normalized >= threshold;
        TickOutput {
            normalized_level: normalized,
            threshold: self.threshold.threshold(),
            above_threshold: above,
            crossing: above && !self.audio.is_above_threshold,
            shot: false,
            beep_fired: false,
            par_fired: false,
        }
    }
}
