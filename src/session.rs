// Session timer - wall-clock reference and shot bookkeeping
//
// Owns the start-time reference, the ordered shot list, and the
// first/split computations the display layer shows. Start and par delays
// are modelled as in-core deadlines checked once per tick, so they are
// deterministic under an injected clock and cancellation is a plain
// state reset.

use std::collections::VecDeque;

use rand::Rng;

use crate::config::StartDelay;

/// Maximum retained shots per session; oldest evicted beyond this
pub const MAX_SHOT_HISTORY: usize = 200;

/// Length of the start tone in milliseconds
pub const BEEP_DURATION_MS: f64 = 100.0;

/// User-visible session state
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    RequestingMic,
    StandBy,
    Beep,
    Calibrating {
        shots_collected: usize,
        shots_required: usize,
    },
}

impl Status {
    /// Display string for the status line.
    pub fn label(&self) -> String {
        match self {
            Status::Idle => "Idle".to_string(),
            Status::RequestingMic => "Requesting microphone...".to_string(),
            Status::StandBy => "Stand by...".to_string(),
            Status::Beep => "BEEP!".to_string(),
            Status::Calibrating {
                shots_collected,
                shots_required,
            } => format!(
                "Recording calibration shots... ({}/{})",
                shots_collected, shots_required
            ),
        }
    }
}

/// One registered shot, as reported to the display layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotRecord {
    /// Zero-based index within the session (counting evicted shots)
    pub index: usize,
    /// Seconds since the start beep
    pub elapsed_s: f64,
    /// Seconds since the previous shot; None for the first
    pub split_s: Option<f64>,
}

pub struct SessionTimer {
    status: Status,
    /// Timestamp of the start beep
    start_time_ms: f64,
    /// Elapsed times in seconds, oldest evicted at capacity
    shots: VecDeque<f64>,
    /// Total shots registered this session, including evicted ones
    total_registered: usize,
    /// Index into `shots` currently shown by the display layer
    view_index: usize,
    pending_start_at_ms: Option<f64>,
    pending_par_at_ms: Option<f64>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self {
            status: Status::Idle,
            start_time_ms: 0.0,
            shots: VecDeque::with_capacity(MAX_SHOT_HISTORY),
            total_registered: 0,
            view_index: 0,
            pending_start_at_ms: None,
            pending_par_at_ms: None,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Clear prior results and schedule the start beep.
    ///
    /// Returns the absolute deadline of the beep.
    pub fn schedule_start(&mut self, now_ms: f64, delay: &StartDelay) -> f64 {
        self.shots.clear();
        self.total_registered = 0;
        self.view_index = 0;
        self.pending_par_at_ms = None;

        let delay_s = match *delay {
            StartDelay::Fixed { seconds } => seconds,
            StartDelay::Random {
                min_seconds,
                max_seconds,
            } => {
                if max_seconds > min_seconds {
                    rand::thread_rng().gen_range(min_seconds..=max_seconds)
                } else {
                    min_seconds
                }
            }
        };

        let deadline = now_ms + delay_s * 1000.0;
        self.pending_start_at_ms = Some(deadline);
        self.status = Status::StandBy;
        deadline
    }

    /// Whether the scheduled start beep is due.
    pub fn start_due(&self, now_ms: f64) -> bool {
        matches!(self.pending_start_at_ms, Some(at) if now_ms >= at)
    }

    /// Whether the scheduled par beep is due.
    pub fn par_due(&self, now_ms: f64) -> bool {
        matches!(self.pending_par_at_ms, Some(at) if now_ms >= at)
    }

    /// Fire the start beep: record the wall-clock reference and schedule
    /// the optional par beep.
    pub fn fire_start(&mut self, now_ms: f64, par_time_seconds: Option<f64>) {
        self.pending_start_at_ms = None;
        self.start_time_ms = now_ms;
        self.pending_par_at_ms = par_time_seconds.map(|s| now_ms + s * 1000.0);
        self.status = Status::Beep;
    }

    /// Consume the par deadline once fired.
    pub fn clear_par(&mut self) {
        self.pending_par_at_ms = None;
    }

    pub fn start_time_ms(&self) -> f64 {
        self.start_time_ms
    }

    /// Record a shot at `now_ms`.
    ///
    /// Appends the elapsed time, evicting the oldest entry beyond
    /// MAX_SHOT_HISTORY, and moves the view to the newest shot.
    pub fn register_shot(&mut self, now_ms: f64) -> ShotRecord {
        let elapsed_s = (now_ms - self.start_time_ms) / 1000.0;
        let split_s = self.shots.back().map(|prev| elapsed_s - prev);

        if self.shots.len() >= MAX_SHOT_HISTORY {
            self.shots.pop_front();
        }
        self.shots.push_back(elapsed_s);
        self.total_registered += 1;
        self.view_index = self.shots.len() - 1;

        ShotRecord {
            index: self.total_registered - 1,
            elapsed_s,
            split_s,
        }
    }

    pub fn shot_count(&self) -> usize {
        self.total_registered
    }

    /// First retained shot's elapsed time.
    pub fn first_shot_s(&self) -> Option<f64> {
        self.shots.front().copied()
    }

    /// Most recent shot's elapsed time.
    pub fn latest_s(&self) -> Option<f64> {
        self.shots.back().copied()
    }

    /// Split at a retained index (None for index 0 or out of range).
    pub fn split_at(&self, index: usize) -> Option<f64> {
        if index == 0 || index >= self.shots.len() {
            return None;
        }
        Some(self.shots[index] - self.shots[index - 1])
    }

    /// Shot currently selected by the display navigation.
    pub fn viewed(&self) -> Option<ShotRecord> {
        let elapsed_s = *self.shots.get(self.view_index)?;
        // Index stays session-wide even after old shots are evicted
        let evicted = self.total_registered - self.shots.len();
        Some(ShotRecord {
            index: evicted + self.view_index,
            elapsed_s,
            split_s: self.split_at(self.view_index),
        })
    }

    /// Move the view forward through history.
    pub fn view_next(&mut self) {
        if self.view_index + 1 < self.shots.len() {
            self.view_index += 1;
        }
    }

    /// Move the view backward through history.
    pub fn view_prev(&mut self) {
        self.view_index = self.view_index.saturating_sub(1);
    }

    /// Result lines for the display layer.
    pub fn format_results(&self) -> Vec<String> {
        self.shots
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                if i == 0 {
                    format!("First Shot: {:.2}s", t)
                } else {
                    format!("Split {}: {:.2}s", i, t - self.shots[i - 1])
                }
            })
            .collect()
    }

    /// Cancel pending deadlines, clear shots, and return to idle.
    pub fn reset(&mut self) {
        self.status = Status::Idle;
        self.start_time_ms = 0.0;
        self.shots.clear();
        self.total_registered = 0;
        self.view_index = 0;
        self.pending_start_at_ms = None;
        self.pending_par_at_ms = None;
    }
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new()
    }
}
