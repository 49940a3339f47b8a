//! Neural decoder/vocoder conditioned on content features and pitch.
//!
//! Transposed-conv upsampling from the 100 Hz feature rate to the package's
//! output rate, with a sine excitation source merged in at every scale. Each
//! upsample stage multiplies the frame rate by one entry of the rate table;
//! kernel and padding are chosen so a stage of rate `r` maps length `L`
//! exactly to `L * r`.

use candle_core::{Device, Tensor};
use candle_nn::{
    Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig, Embedding, Linear, Module,
    VarBuilder,
};

use covox_audio::AudioBuffer;
use covox_base::matrix::FeatureMatrix;
use covox_model::ModelPackage;

use crate::error::ConvertError;
use crate::pitch::PitchContour;
use crate::synth::source::sine_source;

const HIDDEN: usize = 256;
const PITCH_CODES: usize = 256;
const LEAKY_SLOPE: f64 = 0.1;

/// Upsample rate table per output rate; the product is `sample_rate / 100`.
fn upsample_rates(sample_rate: u32) -> Option<&'static [usize]> {
    match sample_rate {
        48000 => Some(&[12, 10, 2, 2]),
        40000 => Some(&[10, 10, 2, 2]),
        32000 => Some(&[10, 8, 2, 2]),
        24000 => Some(&[12, 10, 2]),
        16000 => Some(&[10, 8, 2]),
        _ => None,
    }
}

struct ResBlock {
    conv1: Conv1d,
    conv2: Conv1d,
}

impl ResBlock {
    fn new(channels: usize, vb: VarBuilder) -> Result<Self, candle_core::Error> {
        let cfg = Conv1dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv1: candle_nn::conv1d(channels, channels, 3, cfg, vb.pp("conv1"))?,
            conv2: candle_nn::conv1d(channels, channels, 3, cfg, vb.pp("conv2"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor, candle_core::Error> {
        let h = self.conv1.forward(&candle_nn::ops::leaky_relu(x, LEAKY_SLOPE)?)?;
        let h = self.conv2.forward(&candle_nn::ops::leaky_relu(&h, LEAKY_SLOPE)?)?;
        x + h
    }
}

struct UpsampleStage {
    up: ConvTranspose1d,
    source: Conv1d,
    res: ResBlock,
}

pub struct Synthesizer {
    proj_in: Linear,
    pitch_emb: Embedding,
    conv_pre: Conv1d,
    stages: Vec<UpsampleStage>,
    conv_post: Conv1d,
    sample_rate: u32,
    hop_out: usize,
    feature_dim: usize,
    device: Device,
}

impl Synthesizer {
    /// Loads the decoder from a validated package's weights.
    pub fn load(package: &ModelPackage, device: &Device) -> Result<Self, ConvertError> {
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[package.weights_path()],
                candle_core::DType::F32,
                device,
            )?
        };
        Self::from_varbuilder(vb, package.sample_rate(), package.feature_dim(), device)
    }

    pub(crate) fn from_varbuilder(
        vb: VarBuilder,
        sample_rate: u32,
        feature_dim: usize,
        device: &Device,
    ) -> Result<Self, ConvertError> {
        let rates = upsample_rates(sample_rate).ok_or_else(|| {
            ConvertError::Synthesis(format!("unsupported output sample rate {sample_rate}"))
        })?;
        let hop_out = sample_rate as usize / 100;
        let vb = vb.pp("dec");

        let proj_in = candle_nn::linear(feature_dim, HIDDEN, vb.pp("proj_in"))?;
        let pitch_emb = candle_nn::embedding(PITCH_CODES, HIDDEN, vb.pp("pitch_emb"))?;
        let pre_cfg = Conv1dConfig {
            padding: 3,
            ..Default::default()
        };
        let conv_pre = candle_nn::conv1d(HIDDEN, HIDDEN, 7, pre_cfg, vb.pp("conv_pre"))?;

        let mut stages = Vec::with_capacity(rates.len());
        let mut channels = HIDDEN;
        let mut cumulative = 1usize;
        for (i, &rate) in rates.iter().enumerate() {
            let out_channels = channels / 2;
            cumulative *= rate;
            let up_cfg = ConvTranspose1dConfig {
                stride: rate,
                padding: (rate + 1) / 2,
                output_padding: rate % 2,
                ..Default::default()
            };
            let up = candle_nn::conv_transpose1d(
                channels,
                out_channels,
                rate * 2,
                up_cfg,
                vb.pp(format!("up.{i}")),
            )?;
            // The source runs at the final rate; this conv strides it down to
            // the current stage's rate.
            let src_stride = hop_out / cumulative;
            let src_cfg = Conv1dConfig {
                stride: src_stride,
                ..Default::default()
            };
            let source = candle_nn::conv1d(
                1,
                out_channels,
                src_stride,
                src_cfg,
                vb.pp(format!("source.{i}")),
            )?;
            let res = ResBlock::new(out_channels, vb.pp(format!("res.{i}")))?;
            stages.push(UpsampleStage { up, source, res });
            channels = out_channels;
        }

        let post_cfg = Conv1dConfig {
            padding: 3,
            ..Default::default()
        };
        let conv_post = candle_nn::conv1d(channels, 1, 7, post_cfg, vb.pp("conv_post"))?;

        Ok(Self {
            proj_in,
            pitch_emb,
            conv_pre,
            stages,
            conv_post,
            sample_rate,
            hop_out,
            feature_dim,
            device: device.clone(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn hop_out(&self) -> usize {
        self.hop_out
    }

    /// Synthesizes one chunk. The semitone transpose is applied to the
    /// contour before conditioning, so both the pitch codes and the sine
    /// source see the shifted frequencies. Output is mono at the package's
    /// rate, `frames * hop_out` samples long.
    pub fn synthesize(
        &self,
        features: &FeatureMatrix,
        contour: &PitchContour,
        semitones: i32,
        f0_min: f32,
        f0_max: f32,
    ) -> Result<AudioBuffer, ConvertError> {
        if features.rows() != contour.len() {
            return Err(ConvertError::Shape(format!(
                "features have {} rows but contour has {} frames",
                features.rows(),
                contour.len()
            )));
        }
        if features.dim() != self.feature_dim {
            return Err(ConvertError::Shape(format!(
                "feature dim {} does not match decoder input dim {}",
                features.dim(),
                self.feature_dim
            )));
        }
        let frames = features.rows();
        if frames == 0 {
            return Err(ConvertError::Synthesis("no frames to synthesize".into()));
        }
        let contour = contour.transposed(semitones);
        let coarse = contour.coarse(f0_min, f0_max);
        let f0 = contour.to_hz();

        let feats = Tensor::from_slice(
            features.as_slice(),
            (1, frames, self.feature_dim),
            &self.device,
        )?;
        let mut x = self.proj_in.forward(&feats)?;
        let codes = Tensor::from_vec(coarse, (1, frames), &self.device)?;
        x = (&x + self.pitch_emb.forward(&codes)?)?;
        let mut x = self.conv_pre.forward(&x.transpose(1, 2)?)?;

        let excitation = sine_source(&f0, self.hop_out, self.sample_rate);
        let source = Tensor::from_vec(excitation, (1, 1, frames * self.hop_out), &self.device)?;

        for stage in &self.stages {
            x = candle_nn::ops::leaky_relu(&x, LEAKY_SLOPE)?;
            x = stage.up.forward(&x)?;
            x = (&x + stage.source.forward(&source)?)?;
            x = stage.res.forward(&x)?;
        }
        let x = candle_nn::ops::leaky_relu(&x, LEAKY_SLOPE)?;
        let x = self.conv_post.forward(&x)?.tanh()?;

        let samples = x.squeeze(0)?.squeeze(0)?.to_vec1::<f32>()?;
        if samples.len() != frames * self.hop_out {
            return Err(ConvertError::Synthesis(format!(
                "decoder produced {} samples, expected {}",
                samples.len(),
                frames * self.hop_out
            )));
        }
        Ok(AudioBuffer::mono(samples, self.sample_rate)?)
    }
}
