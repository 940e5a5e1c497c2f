// Shot Timer Core - real-time acoustic shot detection engine
// Frame-by-frame amplitude analysis with adaptive gain and impulse gating

// Module declarations
pub mod analysis;
pub mod audio;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use engine::{EngineEvent, SessionEngine, TickOutput};
pub use session::Status;

/// Initialize logging for the host process.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}
