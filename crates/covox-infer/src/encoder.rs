//! Content feature encoder.
//!
//! Strided conv feature extractor over the raw 16 kHz waveform with a total
//! stride of 320 samples, followed by a linear projection into the shared
//! feature space and a 2x frame repeat up to the 100 Hz feature rate.

use candle_core::{Device, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, LayerNorm, Linear, Module, VarBuilder};

use covox_base::matrix::FeatureMatrix;

use crate::error::ConvertError;
use crate::{ENCODER_STRIDE, FEATURE_DIM};

/// Kernel == stride at every stage, so each stage is an exact downsample.
const STAGES: [(usize, usize, usize); 3] = [(1, 256, 8), (256, 256, 8), (256, 512, 5)];
const CONV_DIM: usize = 512;

pub struct FeatureEncoder {
    convs: Vec<Conv1d>,
    norm: LayerNorm,
    proj: Linear,
    device: Device,
}

impl FeatureEncoder {
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
        let mut convs = Vec::with_capacity(STAGES.len());
        for (i, &(in_c, out_c, k)) in STAGES.iter().enumerate() {
            let cfg = Conv1dConfig {
                stride: k,
                ..Default::default()
            };
            convs.push(candle_nn::conv1d(
                in_c,
                out_c,
                k,
                cfg,
                vb.pp(format!("conv.{i}")),
            )?);
        }
        let norm = candle_nn::layer_norm(CONV_DIM, 1e-5, vb.pp("norm"))?;
        let proj = candle_nn::linear(CONV_DIM, FEATURE_DIM, vb.pp("proj"))?;
        Ok(Self {
            convs,
            norm,
            proj,
            device: device.clone(),
        })
    }

    /// Encodes a chunk of 16 kHz mono samples. The chunk length must be a
    /// multiple of the encoder stride; the pipeline pads chunks before
    /// calling. Output has `2 * len / 320` rows of `FEATURE_DIM` floats.
    pub fn encode(&self, samples: &[f32]) -> Result<FeatureMatrix, ConvertError> {
        if samples.is_empty() || samples.len() % ENCODER_STRIDE != 0 {
            return Err(ConvertError::Shape(format!(
                "encoder chunk length {} is not a positive multiple of {}",
                samples.len(),
                ENCODER_STRIDE
            )));
        }
        let frames = samples.len() / ENCODER_STRIDE;

        let mut x = Tensor::from_slice(samples, (1, 1, samples.len()), &self.device)?;
        for conv in &self.convs {
            x = conv.forward(&x)?.gelu()?;
        }
        // [1, conv_dim, T] -> [1, T, conv_dim]
        let x = x.transpose(1, 2)?;
        let x = self.norm.forward(&x)?;
        let x = self.proj.forward(&x)?;
        // Repeat each frame once: 50 Hz -> 100 Hz
        let x = Tensor::stack(&[&x, &x], 2)?.reshape((1, frames * 2, FEATURE_DIM))?;

        let data = x.squeeze(0)?.flatten_all()?.to_vec1::<f32>()?;
        FeatureMatrix::new(FEATURE_DIM, data)
            .map_err(|e| ConvertError::Shape(format!("encoder output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn zero_encoder() -> FeatureEncoder {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        FeatureEncoder::from_varbuilder(vb, &device).unwrap()
    }

    #[test]
    fn frame_count_is_two_per_stride() {
        let enc = zero_encoder();
        let features = enc.encode(&vec![0.0f32; 3200]).unwrap();
        assert_eq!(features.rows(), 20);
        assert_eq!(features.dim(), FEATURE_DIM);
    }

    #[test]
    fn unpadded_chunk_is_rejected() {
        let enc = zero_encoder();
        assert!(matches!(
            enc.encode(&vec![0.0f32; 321]),
            Err(ConvertError::Shape(_))
        ));
        assert!(matches!(enc.encode(&[]), Err(ConvertError::Shape(_))));
    }

    #[test]
    fn deterministic_for_identical_input() {
        let enc = zero_encoder();
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.01).sin()).collect();
        let a = enc.encode(&samples).unwrap();
        let b = enc.encode(&samples).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
