// Injectable millisecond clock
//
// The engine never reads wall time directly; every timestamp flows through
// a Clock so tests (and clip playback) can drive deterministic ticks.

use std::cell::Cell;
use std::time::Instant;

/// Source of monotonic session time in milliseconds.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> f64;
}

/// Wall-clock time anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually advanced clock for deterministic runs.
///
/// Used by tests and by clip playback, where each tick advances time by
/// exactly one frame hop.
pub struct ManualClock {
    now_ms: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now_ms: Cell::new(0.0),
        }
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance(&self, delta_ms: f64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }

    /// Jump the clock to an absolute timestamp.
    pub fn set(&self, now_ms: f64) {
        self.now_ms.set(now_ms);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now_ms.get()
    }
}
