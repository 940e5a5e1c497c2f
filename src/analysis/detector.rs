// Impulse/shot detector state machine
//
// The central decision engine. Each tick it receives the normalized
// level, the threshold, rise characteristics, and timing history, and
// decides whether a new discrete shot occurred. Two registration paths
// balance competing requirements:
//
// - The silence path (rising edge after a quiet window) rejects
//   sustained noise but forces a wait after every shot.
// - The impulse path (absolute level + sharp transient relative to the
//   recent trend) rejects slow rises such as wind or voice, and lets
//   legitimately fast consecutive shots through once a minimum physical
//   interval has passed, without waiting for full silence.
//
// Echo rejection suppresses closely trailing reflections of the same
// physical shot; the post-beep hard veto and the beep-like flag keep the
// start tone from ever counting as a shot.

/// Minimum single-tick rise for the impulse criterion
pub const IMPULSE_RISE_THRESHOLD: f32 = 0.12;

/// Minimum margin over the recent average for the impulse criterion
pub const IMPULSE_PEAK_BOOST: f32 = 0.10;

/// History samples feeding the recent-average term
pub const IMPULSE_WINDOW_SIZE: usize = 12;

/// Minimum time after a registered impulse before another may register
pub const ECHO_REJECT_MS: f64 = 120.0;

/// Floor past which fast consecutive shots bypass the silence requirement
pub const FAST_SPLIT_MIN_MS: f64 = 250.0;

/// Hard veto window immediately after the beep ends
pub const BEEP_IGNORE_AFTER_MS: f64 = 150.0;

/// Per-tick inputs to the decision step.
///
/// Assembled by the engine from the level pipeline; the detector itself
/// holds only timing state, so the decision is a pure function of this
/// input plus that state.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    /// Post-gain level in [0, 1]
    pub normalized_level: f32,
    /// Current detection threshold
    pub threshold: f32,
    /// normalized_level minus the previous tick's value
    pub rising_edge: f32,
    /// Mean of recent history, excluding the current tick
    pub recent_average: f32,
    /// Whether the previous tick ended above threshold
    pub was_above_threshold: bool,
    /// Beep classifier verdict for this crossing (false outside the
    /// post-beep window)
    pub beep_like: bool,
    /// Session timestamp in milliseconds
    pub now_ms: f64,
}

/// Outcome of one detection tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickDecision {
    /// Level is above threshold this tick
    pub above_threshold: bool,
    /// A rising threshold crossing occurred this tick
    pub crossing: bool,
    /// A new shot registered this tick
    pub shot: bool,
}

/// Shot detector timing state.
///
/// `Idle` until armed by the start beep (`is_active`), then the decision
/// loop runs every tick until reset.
#[derive(Debug, Clone)]
pub struct ShotDetector {
    /// Detection armed only after the start beep fires
    is_active: bool,
    /// Timestamp of the most recently registered shot
    last_shot_time_ms: f64,
    /// Timestamp the level last fell below threshold (falling edge)
    last_below_threshold_time_ms: f64,
    /// Timestamp of the last impulse-registered event, for echo rejection
    last_registered_impulse_ms: f64,
    /// End of the most recent beep
    beep_end_time_ms: f64,
    /// Committed cooldown, milliseconds
    shot_cooldown_ms: f64,
    /// Committed silence window, milliseconds
    min_silence_before_shot_ms: f64,
}

impl ShotDetector {
    pub fn new(shot_cooldown_ms: f64, min_silence_before_shot_ms: f64) -> Self {
        Self {
            is_active: false,
            last_shot_time_ms: f64::NEG_INFINITY,
            last_below_threshold_time_ms: f64::NEG_INFINITY,
            last_registered_impulse_ms: f64::NEG_INFINITY,
            beep_end_time_ms: f64::NEG_INFINITY,
            shot_cooldown_ms,
            min_silence_before_shot_ms,
        }
    }

    /// Arm the detector (start beep fired).
    pub fn activate(&mut self) {
        self.is_active = true;
    }

    /// Disarm without clearing timing history.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Record the end of a beep; starts the hard veto and the
    /// frequency-filter window.
    pub fn set_beep_end(&mut self, beep_end_time_ms: f64) {
        self.beep_end_time_ms = beep_end_time_ms;
    }

    pub fn beep_end_time_ms(&self) -> f64 {
        self.beep_end_time_ms
    }

    pub fn last_shot_time_ms(&self) -> f64 {
        self.last_shot_time_ms
    }

    /// Commit new timing parameters (already clamped by the config layer).
    pub fn set_timing(&mut self, shot_cooldown_ms: f64, min_silence_before_shot_ms: f64) {
        self.shot_cooldown_ms = shot_cooldown_ms;
        self.min_silence_before_shot_ms = min_silence_before_shot_ms;
    }

    /// Return to `Idle`: disarm and clear all timing history.
    pub fn reset(&mut self) {
        self.is_active = false;
        self.last_shot_time_ms = f64::NEG_INFINITY;
        self.last_below_threshold_time_ms = f64::NEG_INFINITY;
        self.last_registered_impulse_ms = f64::NEG_INFINITY;
        self.beep_end_time_ms = f64::NEG_INFINITY;
    }

    /// Run one detection tick.
    ///
    /// Pure decision over the input and internal timing state; on a
    /// positive decision the shot/impulse timestamps advance. The caller
    /// records the shot and advances the edge-tracking state.
    pub fn evaluate(&mut self, input: &TickInput) -> TickDecision {
        let above = input.normalized_level >= input.threshold;

        if !above {
            // Falling edge: remember when the level dropped below, once
            if input.was_above_threshold {
                self.last_below_threshold_time_ms = input.now_ms;
            }
            return TickDecision {
                above_threshold: false,
                crossing: false,
                shot: false,
            };
        }

        let crossing = !input.was_above_threshold;

        let can_register = self.is_active
            && input.now_ms - self.last_shot_time_ms >= self.shot_cooldown_ms
            && input.now_ms > self.beep_end_time_ms + BEEP_IGNORE_AFTER_MS;

        let silence_ready = input.now_ms - self.last_below_threshold_time_ms
            >= self.min_silence_before_shot_ms;
        let silence_ok = crossing && silence_ready;

        let impulse_detected = input.rising_edge >= IMPULSE_RISE_THRESHOLD
            && input.normalized_level - input.recent_average >= IMPULSE_PEAK_BOOST;

        let past_echo_reject =
            input.now_ms - self.last_registered_impulse_ms >= ECHO_REJECT_MS;
        let past_fast_split_min = input.now_ms - self.last_shot_time_ms >= FAST_SPLIT_MIN_MS;

        let allow_by_impulse =
            impulse_detected && past_echo_reject && (past_fast_split_min || silence_ok);

        let shot = can_register && !input.beep_like && (silence_ok || allow_by_impulse);

        if shot {
            self.last_shot_time_ms = input.now_ms;
            self.last_registered_impulse_ms = input.now_ms;
        }

        TickDecision {
            above_threshold: true,
            crossing,
            shot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f32 = 0.3;

    fn armed_detector() -> ShotDetector {
        let mut detector = ShotDetector::new(160.0, 120.0);
        detector.activate();
        detector
    }

    fn quiet_tick(now_ms: f64, was_above: bool) -> TickInput {
        TickInput {
            normalized_level: 0.05,
            threshold: THRESHOLD,
            rising_edge: 0.0,
            recent_average: 0.05,
            was_above_threshold: was_above,
            beep_like: false,
            now_ms,
        }
    }

    fn impulse_tick(now_ms: f64, was_above: bool) -> TickInput {
        TickInput {
            normalized_level: 0.9,
            threshold: THRESHOLD,
            rising_edge: 0.85,
            recent_average: 0.05,
            was_above_threshold: was_above,
            beep_like: false,
            now_ms,
        }
    }

    #[test]
    fn test_single_sharp_impulse_registers_once() {
        let mut detector = armed_detector();

        // Ambient below threshold, then one sharp impulse
        assert!(!detector.evaluate(&quiet_tick(0.0, false)).shot);
        let decision = detector.evaluate(&impulse_tick(1000.0, false));
        assert!(decision.shot, "impulse should register");
        assert!(decision.crossing);

        // Sustained tail above threshold must not register again
        let tail = TickInput {
            rising_edge: 0.0,
            was_above_threshold: true,
            ..impulse_tick(1016.0, true)
        };
        assert!(!detector.evaluate(&tail).shot);
    }

    #[test]
    fn test_inactive_detector_never_registers() {
        let mut detector = ShotDetector::new(160.0, 120.0);
        assert!(!detector.evaluate(&impulse_tick(1000.0, false)).shot);
    }

    #[test]
    fn test_cooldown_blocks_second_impulse() {
        let mut detector = armed_detector();
        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);

        // Level falls below, then a second impulse inside the cooldown
        // and inside the fast-split floor, with no silence window
        detector.evaluate(&quiet_tick(1050.0, true));
        assert!(!detector.evaluate(&impulse_tick(1100.0, false)).shot);
    }

    #[test]
    fn test_spaced_impulses_register_twice() {
        let mut detector = armed_detector();
        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);
        detector.evaluate(&quiet_tick(1050.0, true));
        // 400ms later: cooldown, fast-split floor, and silence all satisfied
        assert!(detector.evaluate(&impulse_tick(1400.0, false)).shot);
    }

    #[test]
    fn test_fast_split_bypasses_silence() {
        let mut detector = armed_detector();
        // Long silence window configured; only the impulse path can pass
        detector.set_timing(160.0, 1000.0);

        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);
        detector.evaluate(&quiet_tick(1100.0, true));
        // 300ms split: past cooldown and FAST_SPLIT_MIN_MS, silence (1s) not
        // yet satisfied, but the sharp transient qualifies
        let decision = detector.evaluate(&impulse_tick(1300.0, false));
        assert!(decision.shot, "fast split should pass via impulse path");
    }

    #[test]
    fn test_slow_rise_rejected_without_silence() {
        let mut detector = armed_detector();
        detector.set_timing(60.0, 500.0);

        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);
        detector.evaluate(&quiet_tick(1050.0, true));

        // Slow swell crossing the threshold 300ms later: silence (500ms)
        // not satisfied and the rise is too gradual for the impulse path
        let swell = TickInput {
            normalized_level: 0.35,
            threshold: THRESHOLD,
            rising_edge: 0.03,
            recent_average: 0.3,
            was_above_threshold: false,
            beep_like: false,
            now_ms: 1350.0,
        };
        assert!(!detector.evaluate(&swell).shot);
    }

    #[test]
    fn test_echo_rejected() {
        let mut detector = armed_detector();
        // Short cooldown so echo rejection is the binding constraint
        detector.set_timing(60.0, 1000.0);

        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);
        detector.evaluate(&quiet_tick(1040.0, true));

        // Reflection 100ms after the shot: past cooldown but inside
        // ECHO_REJECT_MS, silence not satisfied
        assert!(!detector.evaluate(&impulse_tick(1100.0, false)).shot);
    }

    #[test]
    fn test_beep_like_crossing_never_registers() {
        let mut detector = armed_detector();
        let mut input = impulse_tick(1000.0, false);
        input.beep_like = true;
        assert!(!detector.evaluate(&input).shot);
        // The same crossing without the veto would have registered
        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);
    }

    #[test]
    fn test_hard_veto_after_beep() {
        let mut detector = armed_detector();
        detector.set_beep_end(1000.0);

        // Inside beep_end + BEEP_IGNORE_AFTER_MS: vetoed outright
        assert!(!detector.evaluate(&impulse_tick(1100.0, false)).shot);
        // Past the hard veto window: registers
        assert!(detector.evaluate(&impulse_tick(1200.0, false)).shot);
    }

    #[test]
    fn test_falling_edge_records_below_time() {
        let mut detector = armed_detector();
        detector.set_timing(60.0, 200.0);
        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);

        // Fall below at 1100, rise again at 1150: only 50ms of silence
        // and a dull rise, so nothing registers
        detector.evaluate(&quiet_tick(1100.0, true));
        let dull = TickInput {
            normalized_level: 0.4,
            threshold: THRESHOLD,
            rising_edge: 0.05,
            recent_average: 0.35,
            was_above_threshold: false,
            beep_like: false,
            now_ms: 1150.0,
        };
        assert!(!detector.evaluate(&dull).shot);

        // After 300ms below threshold the silence path opens again
        detector.evaluate(&quiet_tick(1200.0, true));
        assert!(detector.evaluate(&impulse_tick(1450.0, false)).shot);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut detector = armed_detector();
        assert!(detector.evaluate(&impulse_tick(1000.0, false)).shot);
        detector.reset();
        assert!(!detector.is_active());
        assert_eq!(detector.last_shot_time_ms(), f64::NEG_INFINITY);
        assert!(!detector.evaluate(&impulse_tick(2000.0, false)).shot);
    }
}
