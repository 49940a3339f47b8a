//! Entry point tying the shared models to per-voice pipelines.

use std::path::Path;
use std::sync::Arc;

use candle_core::Device;

use covox_model::ModelPackage;

use crate::encoder::FeatureEncoder;
use crate::error::ConvertError;
use crate::pipeline::VoicePipeline;
use crate::pitch::PitchEstimator;
use crate::synth::Synthesizer;
use crate::FEATURE_DIM;

/// Shared conversion engine: the pitch estimator and content encoder are
/// voice-independent and loaded once; each voice package then gets its own
/// `VoicePipeline` via [`Conversion::use_voice`].
pub struct Conversion {
    device: Device,
    estimator: Arc<PitchEstimator>,
    encoder: Arc<FeatureEncoder>,
}

impl Conversion {
    pub fn new(
        device: Device,
        pitch_weights: &Path,
        encoder_weights: &Path,
    ) -> Result<Self, ConvertError> {
        let estimator = Arc::new(PitchEstimator::load(pitch_weights, &device)?);
        let encoder = Arc::new(FeatureEncoder::load(encoder_weights, &device)?);
        log::info!(
            "conversion engine ready on {:?} (pitch: {}, encoder: {})",
            device,
            pitch_weights.display(),
            encoder_weights.display()
        );
        Ok(Self {
            device,
            estimator,
            encoder,
        })
    }

    pub fn cpu(pitch_weights: &Path, encoder_weights: &Path) -> Result<Self, ConvertError> {
        Self::new(Device::Cpu, pitch_weights, encoder_weights)
    }

    pub fn cuda(
        ordinal: usize,
        pitch_weights: &Path,
        encoder_weights: &Path,
    ) -> Result<Self, ConvertError> {
        Self::new(Device::new_cuda(ordinal)?, pitch_weights, encoder_weights)
    }

    /// Builds a pipeline for one voice package. The package's decoder must
    /// consume the encoder's feature space.
    pub fn use_voice(&self, package: &ModelPackage) -> Result<VoicePipeline, ConvertError> {
        if package.feature_dim() != FEATURE_DIM {
            return Err(ConvertError::Shape(format!(
                "voice '{}' expects {}-dim features, encoder produces {}",
                package.metadata().name,
                package.feature_dim(),
                FEATURE_DIM
            )));
        }
        let synthesizer = Arc::new(Synthesizer::load(package, &self.device)?);
        let reference = package.index().cloned().map(Arc::new);
        if reference.is_none() {
            log::info!(
                "voice '{}' has no reference index, index blending disabled",
                package.metadata().name
            );
        }
        Ok(VoicePipeline::new(
            self.estimator.clone(),
            self.encoder.clone(),
            synthesizer,
            reference,
        ))
    }
}
