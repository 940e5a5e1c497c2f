// Pre-recorded clip playback via hound
//
// Decodes a WAV file up front into the unsigned 8-bit analysis scale
// (first channel only) and replays it as a sequence of sliding analysis
// windows, advancing a fixed hop per pull. Combined with a manual clock
// advanced by `tick_interval_ms` per pull, a clip run is fully
// deterministic and repeatable.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use log::info;

use super::{sample_to_u8, FramePull, FrameSource};
use crate::analysis::level::DC_CENTER;
use crate::error::AudioError;

/// Pulls per second of clip playback, matching the live display rate
const TICKS_PER_SECOND: usize = 60;

pub struct WavFrameSource {
    samples: Vec<u8>,
    /// End of the current analysis window, in samples
    cursor: usize,
    hop: usize,
    frame_size: usize,
    sample_rate: u32,
    exhausted: bool,
}

impl WavFrameSource {
    /// Decode a WAV clip.
    ///
    /// Supports 16-bit integer and 32-bit float PCM; multi-channel clips
    /// use the first channel.
    pub fn open<P: AsRef<Path>>(path: P, frame_size: usize) -> Result<Self, AudioError> {
        let mut reader = WavReader::open(&path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;

        let samples: Vec<u8> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .step_by(channels)
                .map(|s| s.map(sample_to_u8))
                .collect::<Result<_, _>>()?,
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .step_by(channels)
                .map(|s| s.map(|v| ((v >> 8) as i32 + 128) as u8))
                .collect::<Result<_, _>>()?,
            (format, bits) => {
                return Err(AudioError::ClipDecodeFailed {
                    reason: format!("unsupported sample format {:?} at {} bits", format, bits),
                })
            }
        };

        info!(
            "[Clip] Loaded {:?}: {:.2}s at {} Hz",
            path.as_ref(),
            samples.len() as f64 / spec.sample_rate as f64,
            spec.sample_rate
        );

        Ok(Self::from_samples(samples, spec.sample_rate, frame_size))
    }

    /// Build a source from already-decoded samples.
    pub fn from_samples(samples: Vec<u8>, sample_rate: u32, frame_size: usize) -> Self {
        let hop = (sample_rate as usize / TICKS_PER_SECOND).max(1);
        let exhausted = samples.is_empty();
        Self {
            samples,
            cursor: 0,
            hop,
            frame_size,
            sample_rate,
            exhausted,
        }
    }

    /// Wall-clock time one pull represents, in milliseconds.
    pub fn tick_interval_ms(&self) -> f64 {
        self.hop as f64 / self.sample_rate as f64 * 1000.0
    }
}

impl FrameSource for WavFrameSource {
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<FramePull, AudioError> {
        if frame.len() != self.frame_size {
            return Err(AudioError::FrameSizeMismatch {
                expected: self.frame_size,
                got: frame.len(),
            });
        }
        if self.exhausted {
            return Ok(FramePull::Finished);
        }

        let end = self.cursor + self.hop;
        for (i, slot) in frame.iter_mut().enumerate() {
            // Window covers [end - frame_size, end); out-of-range
            // positions read as silence
            *slot = match (end + i).checked_sub(self.frame_size) {
                Some(idx) if idx < self.samples.len() => self.samples[idx],
                _ => DC_CENTER,
            };
        }
        self.cursor = end;
        if end >= self.samples.len() {
            self.exhausted = true;
        }
        Ok(FramePull::Frame)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sample_rate 480 gives hop = 8 for readable windows
    const SAMPLE_RATE: u32 = 480;
    const FRAME_SIZE: usize = 8;

    #[test]
    fn test_windows_slide_by_hop() {
        let samples: Vec<u8> = (0..24).collect();
        let mut source = WavFrameSource::from_samples(samples, SAMPLE_RATE, FRAME_SIZE);
        let mut frame = [0u8; FRAME_SIZE];

        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        assert_eq!(frame, [0, 1, 2, 3, 4, 5, 6, 7]);

        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        assert_eq!(frame, [8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_leading_window_padded_with_silence() {
        let samples: Vec<u8> = (0..24).collect();
        let mut source = WavFrameSource::from_samples(samples, SAMPLE_RATE, 16);
        let mut frame = [0u8; 16];

        // First pull: only hop samples exist yet, the rest reads silent
        source.next_frame(&mut frame).unwrap();
        assert_eq!(&frame[..8], &[DC_CENTER; 8]);
        assert_eq!(&frame[8..], &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_finished_after_clip_end() {
        let samples: Vec<u8> = (0..20).collect();
        let mut source = WavFrameSource::from_samples(samples, SAMPLE_RATE, FRAME_SIZE);
        let mut frame = [0u8; FRAME_SIZE];

        // 20 samples at hop 8: three pulls cover the clip
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        // Tail of the last window reads silent past the clip end
        assert_eq!(frame[4..], [128, 128, 128, 128]);

        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Finished);
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Finished);
    }

    #[test]
    fn test_empty_clip_finishes_immediately() {
        let mut source = WavFrameSource::from_samples(Vec::new(), SAMPLE_RATE, FRAME_SIZE);
        let mut frame = [0u8; FRAME_SIZE];
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Finished);
    }

    #[test]
    fn test_tick_interval() {
        let source = WavFrameSource::from_samples(vec![128; 100], 48000, FRAME_SIZE);
        // hop 800 at 48 kHz is one 60 Hz display tick
        assert!((source.tick_interval_ms() - 800.0 / 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let mut source = WavFrameSource::from_samples(vec![128; 100], SAMPLE_RATE, FRAME_SIZE);
        let mut wrong = [0u8; 4];
        assert!(matches!(
            source.next_frame(&mut wrong),
            Err(AudioError::FrameSizeMismatch { expected: 8, got: 4 })
        ));
    }
}
