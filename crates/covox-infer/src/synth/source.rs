//! Harmonic excitation source for the vocoder.

use std::f32::consts::PI;

const VOICED_AMP: f32 = 0.1;
const NOISE_AMP: f32 = 0.003;

/// Sample-level sine excitation from a per-frame f0 track (0 = unvoiced).
///
/// Each frame spans `hop_out` output samples. Phase is continuous across
/// frame boundaries; unvoiced frames carry low-level deterministic noise so
/// the source convs see a non-degenerate signal.
pub fn sine_source(f0_hz: &[f32], hop_out: usize, sample_rate: u32) -> Vec<f32> {
    let mut out = Vec::with_capacity(f0_hz.len() * hop_out);
    let mut phase = 0.0f32;
    // xorshift noise, fixed seed for reproducible output
    let mut state = 0x2545_f491u32;
    for &f0 in f0_hz {
        for _ in 0..hop_out {
            if f0 > 0.0 {
                phase += 2.0 * PI * f0 / sample_rate as f32;
                if phase > 2.0 * PI {
                    phase -= 2.0 * PI;
                }
                out.push(VOICED_AMP * phase.sin());
            } else {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let noise = (state as f32 / u32::MAX as f32) * 2.0 - 1.0;
                out.push(NOISE_AMP * noise);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_crossings(signal: &[f32]) -> usize {
        signal
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count()
    }

    #[test]
    fn output_length_is_frames_times_hop() {
        let src = sine_source(&[100.0, 100.0, 0.0], 160, 16000);
        assert_eq!(src.len(), 480);
    }

    #[test]
    fn doubling_f0_doubles_zero_crossings() {
        let hop = 160;
        let low = sine_source(&vec![110.0; 100], hop, 16000);
        let high = sine_source(&vec![220.0; 100], hop, 16000);
        let zl = zero_crossings(&low) as f32;
        let zh = zero_crossings(&high) as f32;
        assert!((zh / zl - 2.0).abs() < 0.1, "ratio was {}", zh / zl);
    }

    #[test]
    fn unvoiced_frames_stay_quiet() {
        let src = sine_source(&[0.0; 10], 160, 16000);
        assert!(src.iter().all(|s| s.abs() <= NOISE_AMP));
    }
}
