// Signal-processing pipeline: level extraction, adaptive gain,
// threshold model, impulse detection, and the beep veto.
//
// Data flow per tick:
// raw frame -> peak_level -> AudioState (gain stage) -> normalized level
// -> ThresholdModel (threshold) + ShotDetector (decision), with the
// BeepClassifier consulted on crossings inside the post-beep window.

pub mod beep;
pub mod detector;
pub mod level;
pub mod threshold;

pub use beep::{BeepClassifier, BeepVerdict};
pub use detector::{ShotDetector, TickDecision, TickInput};
pub use level::{peak_level, AudioState};
pub use threshold::ThresholdModel;
