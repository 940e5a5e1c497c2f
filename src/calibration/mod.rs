// Calibration: derives a detection threshold from observed reference shots.

pub mod procedure;

pub use procedure::{CalibrationProcedure, CalibrationProgress, CalibrationTick};
