//! Log-mel front end for the pitch estimator.
//!
//! Single-threaded DFT per frame; frame counts are exact (`len / hop`) so the
//! contour lines up with the encoder's feature sequence sample for sample.

use std::f32::consts::PI;

pub const N_FFT: usize = 1024;
pub const N_MELS: usize = 128;
pub const MEL_FMIN: f32 = 30.0;
pub const MEL_FMAX: f32 = 8000.0;

const EPSILON: f32 = 1e-10;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank, `[n_mels, n_fft/2 + 1]` row-major.
pub fn mel_filterbank(n_mels: usize, n_fft: usize, sample_rate: u32) -> Vec<f32> {
    let n_bins = n_fft / 2 + 1;
    let mel_min = hz_to_mel(MEL_FMIN);
    let mel_max = hz_to_mel(MEL_FMAX.min(sample_rate as f32 / 2.0));

    // Band edges in FFT-bin space
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| {
            let mel = mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32;
            mel_to_hz(mel) * n_fft as f32 / sample_rate as f32
        })
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_bins];
    for m in 0..n_mels {
        let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
        for bin in 0..n_bins {
            let b = bin as f32;
            let w = if b >= left && b <= center && center > left {
                (b - left) / (center - left)
            } else if b > center && b <= right && right > center {
                (right - b) / (right - center)
            } else {
                0.0
            };
            filters[m * n_bins + bin] = w;
        }
    }
    filters
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

/// DFT squared magnitudes of one windowed frame.
fn dft_power(frame: &[f32]) -> Vec<f32> {
    let n = frame.len();
    let mut power = vec![0.0f32; n / 2 + 1];
    for (k, p) in power.iter_mut().enumerate() {
        let mut real = 0.0f32;
        let mut imag = 0.0f32;
        for (i, &s) in frame.iter().enumerate() {
            let angle = -2.0 * PI * k as f32 * i as f32 / n as f32;
            real += s * angle.cos();
            imag += s * angle.sin();
        }
        *p = real * real + imag * imag;
    }
    power
}

/// Log-mel spectrogram in `[n_mels, frames]` layout with exactly
/// `samples.len() / hop` frames. Frames are centered by reflection padding.
pub fn log_mel(samples: &[f32], hop: usize, sample_rate: u32) -> (Vec<f32>, usize) {
    let frames = samples.len() / hop;
    let filters = mel_filterbank(N_MELS, N_FFT, sample_rate);
    let window = hann_window(N_FFT);
    let n_bins = N_FFT / 2 + 1;

    let padded = reflect_pad(samples, N_FFT / 2);

    let mut mel = vec![0.0f32; N_MELS * frames];
    let mut frame = vec![0.0f32; N_FFT];
    for t in 0..frames {
        let start = t * hop;
        for i in 0..N_FFT {
            let idx = start + i;
            frame[i] = if idx < padded.len() { padded[idx] } else { 0.0 } * window[i];
        }
        let power = dft_power(&frame);
        for m in 0..N_MELS {
            let row = &filters[m * n_bins..(m + 1) * n_bins];
            let sum: f32 = power.iter().zip(row).map(|(p, f)| p * f).sum();
            mel[m * frames + t] = sum.max(EPSILON).log10();
        }
    }
    (mel, frames)
}

fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    if samples.is_empty() {
        return vec![0.0; pad * 2];
    }
    let last = samples.len() - 1;
    let mut out = Vec::with_capacity(samples.len() + 2 * pad);
    for i in (1..=pad).rev() {
        out.push(samples[i.min(last)]);
    }
    out.extend_from_slice(samples);
    for i in 1..=pad {
        out.push(samples[last - i.min(last)]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_is_exact() {
        let samples = vec![0.0f32; 3200];
        let (mel, frames) = log_mel(&samples, 160, 16000);
        assert_eq!(frames, 20);
        assert_eq!(mel.len(), N_MELS * 20);
    }

    #[test]
    fn tone_energy_lands_in_matching_band() {
        // 440 Hz tone should put more energy near its band than far above it
        let sr = 16000;
        let samples: Vec<f32> = (0..3200)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let (mel, frames) = log_mel(&samples, 160, sr as u32);

        // Pick a mid frame and compare a low band against the top band
        let t = frames / 2;
        let low: f32 = (20..40).map(|m| mel[m * frames + t]).sum();
        let high: f32 = (N_MELS - 20..N_MELS).map(|m| mel[m * frames + t]).sum();
        assert!(low > high);
    }

    #[test]
    fn filterbank_rows_are_nonnegative_and_bounded() {
        let fb = mel_filterbank(N_MELS, N_FFT, 16000);
        assert!(fb.iter().all(|&w| (0.0..=1.0).contains(&w)));
        // Every filter has some support
        let n_bins = N_FFT / 2 + 1;
        for m in 1..N_MELS - 1 {
            let sum: f32 = fb[m * n_bins..(m + 1) * n_bins].iter().sum();
            assert!(sum > 0.0, "empty filter row {m}");
        }
    }
}
