// Threshold model: maps user sensitivity onto a detection threshold
//
// The threshold lives on the same normalized [0, 1] scale as the level
// pipeline. Higher sensitivity means a lower threshold (easier to
// trigger). Calibration writes a derived threshold back through the
// inverse map. Observers (the display layer's reference line) follow the
// live value through a watch channel.

use tokio::sync::watch;

/// Detection threshold bounds on the normalized amplitude scale
pub const MIN_THRESHOLD: f32 = 0.1;
pub const MAX_THRESHOLD: f32 = 1.0;

/// Perceptual response curve for raw slider input.
///
/// Linear slider movement feels too coarse near the top of the range, so
/// the raw value is bent before it becomes the effective sensitivity.
pub fn sensitivity_response(slider: f32) -> f32 {
    slider.clamp(0.0, 1.0).powf(1.5)
}

pub struct ThresholdModel {
    sensitivity: f32,
    threshold_tx: watch::Sender<f32>,
}

impl ThresholdModel {
    pub fn new(sensitivity: f32) -> Self {
        let sensitivity = sensitivity.clamp(0.0, 1.0);
        let (threshold_tx, _) = watch::channel(Self::threshold_for(sensitivity));
        Self {
            sensitivity,
            threshold_tx,
        }
    }

    fn threshold_for(sensitivity: f32) -> f32 {
        (MAX_THRESHOLD - sensitivity * (MAX_THRESHOLD - MIN_THRESHOLD))
            .clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }

    /// Current detection threshold in [MIN_THRESHOLD, MAX_THRESHOLD].
    pub fn threshold(&self) -> f32 {
        Self::threshold_for(self.sensitivity)
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Commit a new sensitivity (clamped) and notify observers.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.clamp(0.0, 1.0);
        let _ = self.threshold_tx.send(self.threshold());
    }

    /// Inverse map: set the sensitivity that yields `target_threshold`.
    ///
    /// Used by calibration to write a derived threshold back so the live
    /// threshold line reflects the latest calibration shot. Returns the
    /// resulting (clamped) threshold.
    pub fn apply_sensitivity_threshold(&mut self, target_threshold: f32) -> f32 {
        let target = target_threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        self.sensitivity = (MAX_THRESHOLD - target) / (MAX_THRESHOLD - MIN_THRESHOLD);
        let _ = self.threshold_tx.send(self.threshold());
        self.threshold()
    }

    /// Watch the live threshold value (display reference line).
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.threshold_tx.subscribe()
    }
}
