//! Voice conversion inference: pitch extraction, content encoding, index
//! retrieval, and neural synthesis, stitched together by a chunking pipeline.
//!
//! Analysis always runs at 16 kHz; synthesis runs at the voice package's
//! declared rate. One feature frame covers 160 analysis samples (10 ms).

pub mod config;
pub mod conversion;
pub mod encoder;
pub mod error;
pub mod index;
pub mod mel;
pub mod pipeline;
pub mod pitch;
pub mod synth;

pub use config::ConversionConfig;
pub use conversion::Conversion;
pub use encoder::FeatureEncoder;
pub use error::ConvertError;
pub use pipeline::{CancelHandle, ConversionOutput, ConvertedSegment, TtsEngine, VoicePipeline};
pub use pitch::{PitchContour, PitchEstimator, PitchFrame};
pub use synth::Synthesizer;

/// Fixed analysis rate; every input is resampled here before the models.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16000;
/// Analysis samples per feature frame (10 ms, 100 frames per second).
pub const FRAME_HOP: usize = 160;
/// Total stride of the content encoder's conv stack.
pub const ENCODER_STRIDE: usize = 320;
/// Dimensionality of the shared content feature space.
pub const FEATURE_DIM: usize = 768;
