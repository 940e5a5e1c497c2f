// Frame acquisition: live microphone capture and pre-recorded clips
//
// Both sources present the same pull interface: each call fills the
// caller's buffer with the current analysis window of unsigned 8-bit
// samples. The mic source slides that window over a lock-free ring fed
// by the capture callback; the clip source advances a fixed hop per
// call, so clip playback is deterministic under a manual clock.

pub mod capture;
pub mod wav;

pub use capture::{MicCapture, MicFrameSource};
pub use wav::WavFrameSource;

use crate::error::AudioError;

/// Result of one frame pull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePull {
    /// The buffer now holds the current analysis window
    Frame,
    /// Not enough samples buffered yet; buffer untouched
    Pending,
    /// Source exhausted (clip sources only)
    Finished,
}

/// A source of fixed-size analysis windows.
pub trait FrameSource {
    /// Fill `frame` with the current analysis window.
    ///
    /// `frame` must be exactly the source's configured frame size.
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<FramePull, AudioError>;

    fn sample_rate(&self) -> u32;
}

/// Convert one f32 sample in [-1, 1] to the unsigned 8-bit scale
/// centered at 128.
pub(crate) fn sample_to_u8(sample: f32) -> u8 {
    (128.0 + sample.clamp(-1.0, 1.0) * 127.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_u8_center_and_extremes() {
        assert_eq!(sample_to_u8(0.0), 128);
        assert_eq!(sample_to_u8(1.0), 255);
        assert_eq!(sample_to_u8(-1.0), 1);
    }

    #[test]
    fn test_sample_to_u8_clamps_out_of_range() {
        assert_eq!(sample_to_u8(3.0), 255);
        assert_eq!(sample_to_u8(-3.0), 1);
    }

    #[test]
    fn test_sample_to_u8_monotonic() {
        let mut last = 0u8;
        for i in -100..=100 {
            let v = sample_to_u8(i as f32 / 100.0);
            assert!(v >= last);
            last = v;
        }
    }
}
