//! Salience-based neural pitch estimator.
//!
//! A log-mel front end feeds a small conv stack that emits a 360-bin salience
//! map per frame (20-cent bins starting at ~32.7 Hz). Decoding refines the
//! argmax bin with a salience-weighted average over its neighbors.

use candle_core::{Device, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Module, VarBuilder};

use crate::error::ConvertError;
use crate::mel::{self, N_MELS};
use crate::pitch::contour::{PitchContour, PitchFrame};
use crate::{ANALYSIS_SAMPLE_RATE, FRAME_HOP};

pub const N_PITCH_BINS: usize = 360;
const CENTS_PER_BIN: f32 = 20.0;
/// Cents of the lowest bin center (~32.70 Hz) relative to 10 Hz.
const CENTS_BASE: f32 = 1997.379_4;
const REFINE_RADIUS: usize = 4;
/// Peak salience below this marks the frame unvoiced.
const SALIENCE_FLOOR: f32 = 0.05;
/// Frame RMS below this marks the frame unvoiced regardless of salience.
const ENERGY_GATE: f32 = 1e-3;

const HIDDEN: usize = 256;

struct SalienceNet {
    conv_in: Conv1d,
    res1: Conv1d,
    res2: Conv1d,
    conv_out: Conv1d,
}

impl SalienceNet {
    fn new(vb: VarBuilder) -> Result<Self, candle_core::Error> {
        let pad2 = Conv1dConfig {
            padding: 2,
            ..Default::default()
        };
        let pad1 = Conv1dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv_in: candle_nn::conv1d(N_MELS, HIDDEN, 5, pad2, vb.pp("conv_in"))?,
            res1: candle_nn::conv1d(HIDDEN, HIDDEN, 3, pad1.clone(), vb.pp("res1"))?,
            res2: candle_nn::conv1d(HIDDEN, HIDDEN, 3, pad1, vb.pp("res2"))?,
            conv_out: candle_nn::conv1d(
                HIDDEN,
                N_PITCH_BINS,
                1,
                Conv1dConfig::default(),
                vb.pp("conv_out"),
            )?,
        })
    }

    /// `[1, n_mels, T]` -> `[1, 360, T]` salience in (0, 1).
    fn forward(&self, mel: &Tensor) -> Result<Tensor, candle_core::Error> {
        let mut x = candle_nn::ops::leaky_relu(&self.conv_in.forward(mel)?, 0.1)?;
        x = (&x + candle_nn::ops::leaky_relu(&self.res1.forward(&x)?, 0.1)?)?;
        x = (&x + candle_nn::ops::leaky_relu(&self.res2.forward(&x)?, 0.1)?)?;
        candle_nn::ops::sigmoid(&self.conv_out.forward(&x)?)
    }
}

pub struct PitchEstimator {
    net: SalienceNet,
    device: Device,
}

impl PitchEstimator {
    pub fn load(path: &std::path::Path, device: &Device) -> Result<Self, ConvertError> {
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], candle_core::DType::F32, device)?
        };
        Self::from_varbuilder(vb, device)
    }

    pub(crate) fn from_varbuilder(
        vb: VarBuilder,
        device: &Device,
    ) -> Result<Self, ConvertError> {
        Ok(Self {
            net: SalienceNet::new(vb)?,
            device: device.clone(),
        })
    }

    /// Extracts a pitch contour at the analysis frame rate. The contour has
    /// exactly `samples.len() / FRAME_HOP` frames. Silence decodes to
    /// unvoiced frames, an empty buffer is an error.
    pub fn extract(
        &self,
        samples: &[f32],
        f0_min: f32,
        f0_max: f32,
    ) -> Result<PitchContour, ConvertError> {
        if samples.len() < FRAME_HOP {
            return Err(ConvertError::Pitch(format!(
                "buffer too short for pitch analysis: {} samples",
                samples.len()
            )));
        }
        let (mel, frames) = mel::log_mel(samples, FRAME_HOP, ANALYSIS_SAMPLE_RATE);
        let mel = Tensor::from_vec(mel, (1, N_MELS, frames), &self.device)?;
        let salience = self.net.forward(&mel)?;
        let salience = salience.squeeze(0)?.transpose(0, 1)?; // [T, 360]
        let salience = salience.to_vec2::<f32>()?;

        let mut out = Vec::with_capacity(frames);
        for (t, row) in salience.iter().enumerate() {
            let rms = frame_rms(samples, t);
            out.push(decode_frame(row, rms, f0_min, f0_max));
        }
        Ok(PitchContour::new(out))
    }
}

fn frame_rms(samples: &[f32], frame: usize) -> f32 {
    let start = frame * FRAME_HOP;
    let end = (start + FRAME_HOP).min(samples.len());
    if end <= start {
        return 0.0;
    }
    let sum: f32 = samples[start..end].iter().map(|s| s * s).sum();
    (sum / (end - start) as f32).sqrt()
}

fn decode_frame(salience: &[f32], rms: f32, f0_min: f32, f0_max: f32) -> PitchFrame {
    if rms < ENERGY_GATE {
        return PitchFrame::Unvoiced;
    }
    let (peak_bin, peak) = salience
        .iter()
        .enumerate()
        .fold((0usize, f32::MIN), |(bi, bv), (i, &v)| {
            if v > bv { (i, v) } else { (bi, bv) }
        });
    if peak < SALIENCE_FLOOR {
        return PitchFrame::Unvoiced;
    }

    // Salience-weighted cents average around the peak bin
    let lo = peak_bin.saturating_sub(REFINE_RADIUS);
    let hi = (peak_bin + REFINE_RADIUS + 1).min(salience.len());
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for bin in lo..hi {
        let cents = CENTS_BASE + bin as f32 * CENTS_PER_BIN;
        weighted += cents * salience[bin];
        total += salience[bin];
    }
    if total <= 0.0 {
        return PitchFrame::Unvoiced;
    }
    let hz = 10.0 * 2.0f32.powf(weighted / total / 1200.0);
    if hz < f0_min || hz > f0_max {
        PitchFrame::Unvoiced
    } else {
        PitchFrame::Voiced(hz)
    }
}
