// Beep classifier - frequency-domain veto for the start tone
//
// Active only during a short window after the beep ends. A threshold
// crossing inside that window gets a spectral snapshot and is vetoed as
// beep-like when the energy is narrowband and tonal:
//
// - dominant-bin ratio (max magnitude / sum of magnitudes) > 0.45
// - normalized spectral entropy < 0.55
// - dominant frequency inside the beep band
//
// Gunshot-like transients are broadband (high entropy, no dominant bin)
// and fail this test, so real shots pass even inside the window while
// the reference tone itself is rejected.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::analysis::level::DC_CENTER;

/// Post-beep window during which crossings get the frequency veto
pub const BEEP_FFT_WINDOW_MS: f64 = 300.0;

/// Minimum dominant-bin energy ratio for a beep verdict
pub const BEEP_DOMINANT_RATIO_MIN: f32 = 0.45;

/// Maximum normalized spectral entropy for a beep verdict
pub const BEEP_ENTROPY_MAX: f32 = 0.55;

/// Frequency band of the reference tone and its low harmonics
pub const BEEP_FREQUENCY_MIN_HZ: f32 = 600.0;
pub const BEEP_FREQUENCY_MAX_HZ: f32 = 3200.0;

/// Spectral measurements for one classified crossing.
#[derive(Debug, Clone, Copy)]
pub struct BeepVerdict {
    pub is_beep_like: bool,
    pub dominant_ratio: f32,
    pub entropy: f32,
    pub dominant_frequency_hz: f32,
}

pub struct BeepClassifier {
    fft_planner: FftPlanner<f32>,
    sample_rate: u32,
    fft_size: usize,
    // Hann window to reduce spectral leakage
    window: Vec<f32>,
}

impl BeepClassifier {
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        Self {
            fft_planner: FftPlanner::new(),
            sample_rate,
            fft_size,
            window,
        }
    }

    /// Whether `now` is still inside the post-beep frequency-filter window.
    pub fn window_active(&self, beep_end_time_ms: f64, now_ms: f64) -> bool {
        now_ms <= beep_end_time_ms + BEEP_FFT_WINDOW_MS
    }

    /// Classify a frame's spectral snapshot.
    pub fn classify(&mut self, frame: &[u8]) -> BeepVerdict {
        let spectrum = self.magnitude_spectrum(frame);

        // Skip the DC bin; quantization offset would dominate quiet frames
        let bins = &spectrum[1..];
        let sum: f32 = bins.iter().sum();

        if sum <= 1e-6 {
            return BeepVerdict {
                is_beep_like: false,
                dominant_ratio: 0.0,
                entropy: 1.0,
                dominant_frequency_hz: 0.0,
            };
        }

        let (max_idx, max_val) = bins
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            });

        let dominant_ratio = max_val / sum;
        let entropy = Self::normalized_entropy(bins, sum);
        let bin_width = self.sample_rate as f32 / self.fft_size as f32;
        let dominant_frequency_hz = (max_idx + 1) as f32 * bin_width;

        let is_beep_like = dominant_ratio > BEEP_DOMINANT_RATIO_MIN
            && entropy < BEEP_ENTROPY_MAX
            && (BEEP_FREQUENCY_MIN_HZ..=BEEP_FREQUENCY_MAX_HZ).contains(&dominant_frequency_hz);

        BeepVerdict {
            is_beep_like,
            dominant_ratio,
            entropy,
            dominant_frequency_hz,
        }
    }

    /// Shannon entropy of the magnitude distribution, normalized to [0, 1]
    /// by the maximum (uniform) entropy. Low values mean tonal content.
    fn normalized_entropy(bins: &[f32], sum: f32) -> f32 {
        let mut entropy = 0.0f32;
        for &mag in bins {
            if mag > 1e-10 {
                let p = mag / sum;
                entropy -= p * p.ln();
            }
        }
        entropy / (bins.len() as f32).ln()
    }

    /// Magnitude spectrum of the frame (positive frequencies only).
    fn magnitude_spectrum(&mut self, frame: &[u8]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = Vec::with_capacity(self.fft_size);

        for (i, &sample) in frame.iter().take(self.fft_size).enumerate() {
            let centered = (sample as f32 - DC_CENTER as f32) / DC_CENTER as f32;
            buffer.push(Complex::new(centered * self.window[i], 0.0));
        }
        // Zero-pad short frames
        while buffer.len() < self.fft_size {
            buffer.push(Complex::new(0.0, 0.0));
        }

        let fft = self.fft_planner.plan_fft_forward(self.fft_size);
        fft.process(&mut buffer);

        buffer[..self.fft_size / 2 + 1]
            .iter()
            .map(|c| c.norm())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;
    const FFT_SIZE: usize = 2048;

    /// Sine frame at an exact FFT bin frequency, as DC-centered u8.
    fn tone_frame(bin: usize, amplitude: f32) -> Vec<u8> {
        let freq = bin as f32 * SAMPLE_RATE as f32 / FFT_SIZE as f32;
        (0..FFT_SIZE)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                let s = amplitude * (2.0 * std::f32::consts::PI * freq * t).sin();
                (128.0 + s * 127.0).round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Deterministic broadband noise frame (LCG).
    fn noise_frame(amplitude: f32) -> Vec<u8> {
        let mut state = 0x2545_f491u32;
        (0..FFT_SIZE)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let uniform = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                (128.0 + uniform * amplitude * 127.0)
                    .round()
                    .clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    #[test]
    fn test_tonal_signal_in_band_is_beep_like() {
        let mut classifier = BeepClassifier::new(SAMPLE_RATE, FFT_SIZE);
        // Bin 98 is ~2297 Hz, inside the beep band
        let verdict = classifier.classify(&tone_frame(98, 0.9));

        assert!(verdict.dominant_ratio > BEEP_DOMINANT_RATIO_MIN);
        assert!(verdict.entropy < BEEP_ENTROPY_MAX);
        assert!(verdict.dominant_frequency_hz > 2200.0);
        assert!(verdict.dominant_frequency_hz < 2400.0);
        assert!(verdict.is_beep_like);
    }

    #[test]
    fn test_reference_tone_frequency_is_beep_like() {
        let mut classifier = BeepClassifier::new(SAMPLE_RATE, FFT_SIZE);
        // Bin 51 is ~1195 Hz, the start tone's fundamental
        let verdict = classifier.classify(&tone_frame(51, 0.8));
        assert!(verdict.is_beep_like);
    }

    #[test]
    fn test_broadband_impulse_not_beep_like() {
        let mut classifier = BeepClassifier::new(SAMPLE_RATE, FFT_SIZE);
        let verdict = classifier.classify(&noise_frame(0.9));

        assert!(
            verdict.dominant_ratio < BEEP_DOMINANT_RATIO_MIN,
            "noise should have no dominant bin (ratio {})",
            verdict.dominant_ratio
        );
        assert!(
            verdict.entropy > BEEP_ENTROPY_MAX,
            "noise should be high entropy (got {})",
            verdict.entropy
        );
        assert!(!verdict.is_beep_like);
    }

    #[test]
    fn test_tone_outside_band_not_beep_like() {
        let mut classifier = BeepClassifier::new(SAMPLE_RATE, FFT_SIZE);
        // Bin 427 is ~10 kHz: tonal but far above the beep band
        let verdict = classifier.classify(&tone_frame(427, 0.9));
        assert!(verdict.entropy < BEEP_ENTROPY_MAX);
        assert!(!verdict.is_beep_like);
    }

    #[test]
    fn test_silent_frame_not_beep_like() {
        let mut classifier = BeepClassifier::new(SAMPLE_RATE, FFT_SIZE);
        let verdict = classifier.classify(&vec![128u8; FFT_SIZE]);
        assert!(!verdict.is_beep_like);
    }

    #[test]
    fn test_window_active_bounds() {
        let classifier = BeepClassifier::new(SAMPLE_RATE, FFT_SIZE);
        let beep_end = 1000.0;
        assert!(classifier.window_active(beep_end, 1000.0));
        assert!(classifier.window_active(beep_end, 1000.0 + BEEP_FFT_WINDOW_MS));
        assert!(!classifier.window_active(beep_end, 1001.0 + BEEP_FFT_WINDOW_MS));
        // No beep yet: window never active
        assert!(!classifier.window_active(f64::NEG_INFINITY, 0.0));
    }
}
