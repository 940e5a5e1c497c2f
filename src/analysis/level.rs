// Level extraction and adaptive gain normalization
//
// Converts a raw time-domain frame into a single normalized amplitude
// scalar per tick. A simple per-frame peak (not RMS) is used so short
// impulsive transients are not averaged away. The adaptive gain stage
// compensates for microphone distance/gain so one threshold scale works
// across environments:
//
// 1. smoothed  <- EMA of raw peak (symmetric attack/decay)
// 2. gain_ref  <- slower EMA tracking ambient/sustained level
// 3. desired   = AUTO_GAIN_TARGET / max(gain_ref, floor)
// 4. auto_gain <- lerped toward clamp(desired) to avoid threshold
//                 oscillation from gain snapping
// 5. normalized = clamp(max(raw, smoothed) * auto_gain, 0, 1)
//
// Using max(raw, smoothed) lets a sudden transient bypass the smoothing
// while the gain reference still reflects ambient loudness, so impulses
// are not suppressed by the same average used to normalize them.

use std::collections::VecDeque;

/// DC center of unsigned 8-bit samples
pub const DC_CENTER: u8 = 128;

/// EMA factor for the smoothed level (fast)
pub const AMPLITUDE_SMOOTHING: f32 = 0.2;

/// EMA factor for the auto-gain reference level (slow, lags transients)
pub const AUTO_GAIN_SMOOTHING: f32 = 0.08;

/// Normalized headroom the gain stage drives ambient level toward
pub const AUTO_GAIN_TARGET: f32 = 0.25;

/// Floor on the gain reference; avoids division blow-up in near-silence
pub const AUTO_GAIN_FLOOR: f32 = 0.02;

/// Gain multiplier bounds
pub const AUTO_GAIN_MIN: f32 = 1.0;
pub const AUTO_GAIN_MAX: f32 = 8.0;

/// Lerp factor chasing the desired gain
pub const AUTO_GAIN_LERP: f32 = 0.1;

/// Capacity of the recent normalized-level history
pub const LEVEL_HISTORY_CAPACITY: usize = 120;

/// Duration of the crossing/shot display pulses in milliseconds
pub const PULSE_MS: f64 = 120.0;

/// Extract the peak amplitude of a frame, normalized to [0, 1].
///
/// Samples are unsigned 8-bit, DC-centered at 128; the peak is
/// `max |s - 128| / 128` over the frame. Returns 0.0 for a perfectly
/// centered silent frame.
pub fn peak_level(frame: &[u8]) -> f32 {
    let mut peak = 0u8;
    for &sample in frame {
        let v = sample.abs_diff(DC_CENTER);
        if v > peak {
            peak = v;
        }
    }
    peak as f32 / DC_CENTER as f32
}

/// Per-session amplitude state, mutated exactly once per tick.
///
/// Owned exclusively by the engine; the display layer reads it through
/// engine accessors.
#[derive(Debug, Clone)]
pub struct AudioState {
    /// Raw per-frame peak from the level extractor
    pub raw_level: f32,
    /// Fast EMA of the raw peak
    pub smoothed_level: f32,
    /// Post-gain level, clamped to [0, 1]
    pub normalized_level: f32,
    /// Slow EMA used to derive the gain (ambient reference)
    pub auto_gain_level: f32,
    /// Current gain multiplier, itself smoothed
    pub auto_gain: f32,
    /// Recent normalized levels, oldest evicted at capacity
    pub history: VecDeque<f32>,
    /// Whether the previous tick ended above threshold (edge tracking)
    pub is_above_threshold: bool,
    /// Previous tick's normalized level, for the rising-edge term
    pub last_normalized_level: f32,
    /// Display hint: crossing flash active until this timestamp
    pub crossing_pulse_until: f64,
    /// Display hint: shot flash active until this timestamp
    pub shot_pulse_until: f64,
}

impl AudioState {
    pub fn new() -> Self {
        Self {
            raw_level: 0.0,
            smoothed_level: 0.0,
            normalized_level: 0.0,
            auto_gain_level: 0.0,
            auto_gain: AUTO_GAIN_MIN,
            history: VecDeque::with_capacity(LEVEL_HISTORY_CAPACITY),
            is_above_threshold: false,
            last_normalized_level: 0.0,
            crossing_pulse_until: 0.0,
            shot_pulse_until: 0.0,
        }
    }

    /// Run the gain stage for one tick.
    ///
    /// Updates all smoothed levels and returns the new normalized level.
    /// Does not touch edge-tracking fields; the engine advances those
    /// after the detection decision.
    pub fn update(&mut self, raw_peak: f32) -> f32 {
        self.raw_level = raw_peak;
        self.smoothed_level += (raw_peak - self.smoothed_level) * AMPLITUDE_SMOOTHING;
        self.auto_gain_level += (self.smoothed_level - self.auto_gain_level) * AUTO_GAIN_SMOOTHING;

        let desired_gain = AUTO_GAIN_TARGET / self.auto_gain_level.max(AUTO_GAIN_FLOOR);
        let desired_gain = desired_gain.clamp(AUTO_GAIN_MIN, AUTO_GAIN_MAX);
        self.auto_gain += (desired_gain - self.auto_gain) * AUTO_GAIN_LERP;
        self.auto_gain = self.auto_gain.clamp(AUTO_GAIN_MIN, AUTO_GAIN_MAX);

        let level_for_detection = raw_peak.max(self.smoothed_level);
        self.normalized_level = (level_for_detection * self.auto_gain).clamp(0.0, 1.0);
        self.normalized_level
    }

    /// Mean of the most recent `window` history samples (excluding the
    /// current tick, which is pushed only after the decision).
    pub fn recent_average(&self, window: usize) -> f32 {
        if self.history.is_empty() || window == 0 {
            return 0.0;
        }
        let take = window.min(self.history.len());
        let sum: f32 = self.history.iter().rev().take(take).sum();
        sum / take as f32
    }

    /// Append the current normalized level to the history, evicting the
    /// oldest entry at capacity.
    pub fn push_history(&mut self) {
        if self.history.len() >= LEVEL_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(self.normalized_level);
    }

    /// Reset all per-session state.
    pub fn reset(&mut self) {
        *self = AudioState::new();
    }
}

impl Default for AudioState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_level_silent_frame() {
        let frame = vec![DC_CENTER; 2048];
        assert_eq!(peak_level(&frame), 0.0);
    }

    #[test]
    fn test_peak_level_full_scale() {
        let mut frame = vec![DC_CENTER; 2048];
        frame[100] = 0; // |0 - 128| = 128
        assert_eq!(peak_level(&frame), 1.0);
    }

    #[test]
    fn test_peak_level_symmetric() {
        let mut positive = vec![DC_CENTER; 64];
        positive[3] = 192;
        let mut negative = vec![DC_CENTER; 64];
        negative[3] = 64;
        assert_eq!(peak_level(&positive), peak_level(&negative));
    }

    #[test]
    fn test_peak_level_in_unit_range() {
        // All possible sample values stay within [0, 1]
        for s in 0..=255u8 {
            let level = peak_level(&[s]);
            assert!((0.0..=1.0).contains(&level), "level {} out of range", level);
        }
    }

    #[test]
    fn test_normalized_level_clamped() {
        let mut state = AudioState::new();
        for _ in 0..1000 {
            let level = state.update(1.0);
            assert!((0.0..=1.0).contains(&level));
        }
    }

    #[test]
    fn test_auto_gain_stays_in_bounds() {
        let mut state = AudioState::new();
        // Long alternating loud/silent run must never push gain out of bounds
        for i in 0..100_000 {
            let raw = if i % 97 == 0 { 0.9 } else { 0.001 };
            state.update(raw);
            assert!(
                (AUTO_GAIN_MIN..=AUTO_GAIN_MAX).contains(&state.auto_gain),
                "auto_gain {} escaped bounds at tick {}",
                state.auto_gain,
                i
            );
        }
    }

    #[test]
    fn test_gain_rises_in_quiet_environment() {
        let mut state = AudioState::new();
        for _ in 0..500 {
            state.update(0.01);
        }
        // Quiet ambient should drive the gain well above unity
        assert!(state.auto_gain > 2.0, "gain {} too low", state.auto_gain);
    }

    #[test]
    fn test_transient_bypasses_smoothing() {
        let mut state = AudioState::new();
        for _ in 0..200 {
            state.update(0.05);
        }
        let before = state.normalized_level;
        let after = state.update(0.9);
        // The impulse must show up immediately, not after the EMA catches up
        assert!(after > before + 0.3, "impulse suppressed: {} -> {}", before, after);
    }

    #[test]
    fn test_history_bounded() {
        let mut state = AudioState::new();
        for i in 0..(LEVEL_HISTORY_CAPACITY * 2) {
            state.normalized_level = i as f32;
            state.push_history();
        }
        assert_eq!(state.history.len(), LEVEL_HISTORY_CAPACITY);
        // Oldest entries were evicted
        assert_eq!(
            *state.history.front().unwrap(),
            LEVEL_HISTORY_CAPACITY as f32
        );
    }

    #[test]
    fn test_recent_average_excludes_current() {
        let mut state = AudioState::new();
        for _ in 0..10 {
            state.normalized_level = 0.1;
            state.push_history();
        }
        state.normalized_level = 0.9; // current tick, not yet pushed
        let avg = state.recent_average(10);
        assert!((avg - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_recent_average_empty_history() {
        let state = AudioState::new();
        assert_eq!(state.recent_average(12), 0.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut state = AudioState::new();
        state.update(0.8);
        state.push_history();
        state.is_above_threshold = true;
        state.reset();
        assert_eq!(state.normalized_level, 0.0);
        assert!(state.history.is_empty());
        assert!(!state.is_above_threshold);
    }
}
