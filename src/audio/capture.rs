// Live microphone capture via cpal
//
// The capture callback converts incoming f32 samples to the unsigned
// 8-bit analysis scale and pushes them into a lock-free SPSC ring; no
// allocation or locking happens on the audio thread. The consumer side
// (`MicFrameSource`) drains the ring on the engine's tick cadence and
// maintains a sliding window of the most recent frame_size samples.

use std::collections::VecDeque;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use rtrb::{Consumer, RingBuffer};

use super::{sample_to_u8, FramePull, FrameSource};
use crate::error::AudioError;

/// Ring capacity in samples (one second at 48 kHz)
const RING_CAPACITY: usize = 48_000;

/// Owns the cpal input stream and its lifecycle.
///
/// The stream is created paused; `start` begins capture. Dropping the
/// capture tears the stream down.
pub struct MicCapture {
    stream: cpal::Stream,
    running: bool,
    sample_rate: u32,
}

impl MicCapture {
    /// Open the default input device and wire its callback to a new
    /// frame source.
    pub fn open(frame_size: usize) -> Result<(Self, MicFrameSource), AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::InputUnavailable {
                details: "no default input device".to_string(),
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("failed to get default input config: {:?}", e),
            })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels = stream_config.channels as usize;
        let sample_rate = stream_config.sample_rate.0;

        let (mut producer, consumer) = RingBuffer::<u8>::new(RING_CAPACITY);

        let err_fn = |err| warn!("[Capture] Input stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // First channel only; overflow samples are dropped
                    for frame in data.chunks(channels) {
                        if let Some(&sample) = frame.first() {
                            let _ = producer.push(sample_to_u8(sample));
                        }
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(AudioError::StreamOpenFailed {
                    reason: format!("unsupported input sample format {:?}", other),
                })
            }
        }
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        info!(
            "[Capture] Opened input device {:?} at {} Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels
        );

        let source = MicFrameSource::new(consumer, frame_size, sample_rate);
        Ok((
            Self {
                stream,
                running: false,
                sample_rate,
            },
            source,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Begin capture.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running {
            return Err(AudioError::AlreadyRunning);
        }
        self.stream
            .play()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("input start failed: {}", e),
            })?;
        self.running = true;
        Ok(())
    }

    /// Pause capture; the stream can be started again.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if !self.running {
            return Err(AudioError::NotRunning);
        }
        if let Err(e) = self.stream.pause() {
            warn!("[Capture] Pause failed: {}", e);
        }
        self.running = false;
        Ok(())
    }
}

/// Consumer half of the capture ring.
///
/// Keeps the most recent `frame_size` samples as the analysis window.
/// Reports `Pending` until the window has filled once after startup.
pub struct MicFrameSource {
    consumer: Consumer<u8>,
    window: VecDeque<u8>,
    frame_size: usize,
    sample_rate: u32,
    primed: bool,
}

impl MicFrameSource {
    pub(crate) fn new(consumer: Consumer<u8>, frame_size: usize, sample_rate: u32) -> Self {
        Self {
            consumer,
            window: VecDeque::with_capacity(frame_size),
            frame_size,
            sample_rate,
            primed: false,
        }
    }
}

impl FrameSource for MicFrameSource {
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<FramePull, AudioError> {
        if frame.len() != self.frame_size {
            return Err(AudioError::FrameSizeMismatch {
                expected: self.frame_size,
                got: frame.len(),
            });
        }

        while let Ok(sample) = self.consumer.pop() {
            if self.window.len() >= self.frame_size {
                self.window.pop_front();
            }
            self.window.push_back(sample);
        }

        if !self.primed {
            if self.window.len() < self.frame_size {
                return Ok(FramePull::Pending);
            }
            self.primed = true;
        }

        for (dst, &src) in frame.iter_mut().zip(self.window.iter()) {
            *dst = src;
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

    const FRAME_SIZE: usize = 8;

    fn source_with_producer() -> (rtrb::Producer<u8>, MicFrameSource) {
        let (producer, consumer) = RingBuffer::<u8>::new(64);
        (producer, MicFrameSource::new(consumer, FRAME_SIZE, 48000))
    }

    #[test]
    fn test_pending_until_window_fills() {
        let (mut producer, mut source) = source_with_producer();
        let mut frame = [0u8; FRAME_SIZE];

        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Pending);

        for i in 0..FRAME_SIZE - 1 {
            producer.push(i as u8).unwrap();
        }
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Pending);

        producer.push(7).unwrap();
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        assert_eq!(frame, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_window_slides_over_new_samples() {
        let (mut producer, mut source) = source_with_producer();
        let mut frame = [0u8; FRAME_SIZE];

        for i in 0..FRAME_SIZE {
            producer.push(i as u8).unwrap();
        }
        source.next_frame(&mut frame).unwrap();

        // Three newer samples shift the window forward by three
        for v in [100, 101, 102] {
            producer.push(v).unwrap();
        }
        assert_eq!(source.next_frame(&mut frame).unwrap(), FramePull::Frame);
        assert_eq!(frame, [3, 4, 5, 6, 7, 100, 101, 102]);
    }

    #[test]
    fn test_primed_source_repeats_window_without_new_samples() {
        let (mut producer, mut source) = source_with_producer();
        let mut frame = [0u8; FRAME_SIZE];

        for i in 0..FRAME_SIZE {
            producer.push(i as u8).unwrap();
        }
        source.next_frame(&mut frame).unwrap();

        // No new samples: the window stays valid, not Pending
        let mut again = [0u8; FRAME_SIZE];
        assert_eq!(source.next_frame(&mut again).unwrap(), FramePull::Frame);
        assert_eq!(again, frame);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let (_producer, mut source) = source_with_producer();
        let mut wrong = [0u8; 4];
        assert_eq!(
            source.next_frame(&mut wrong),
            Err(AudioError::FrameSizeMismatch {
                expected: FRAME_SIZE,
                got: 4
            })
        );
    }
}
