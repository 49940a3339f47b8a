//! Conversion pipeline: chunking, per-chunk inference, stitching, mixdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use covox_audio::{crossfade_join, mix, AudioBuffer, AudioError, MixConfig};
use covox_base::matrix::FeatureMatrix;

use crate::config::ConversionConfig;
use crate::encoder::FeatureEncoder;
use crate::error::ConvertError;
use crate::index;
use crate::pitch::PitchEstimator;
use crate::synth::Synthesizer;
use crate::{ANALYSIS_SAMPLE_RATE, ENCODER_STRIDE, FRAME_HOP};

/// Longest stretch of audio sent through the models in one piece.
pub const MAX_WINDOW_SECS: usize = 20;
/// Overlap between adjacent windows, crossfaded away at the output rate.
pub const OVERLAP_SECS: usize = 1;

const MAX_WINDOW: usize = MAX_WINDOW_SECS * ANALYSIS_SAMPLE_RATE as usize;
const OVERLAP: usize = OVERLAP_SECS * ANALYSIS_SAMPLE_RATE as usize;

/// Cooperative cancellation flag, checked at chunk boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// External speech synthesis collaborator. Implementations produce a plain
/// audio buffer from text; the buffer then runs through the same conversion
/// path as recorded audio.
pub trait TtsEngine: Send + Sync {
    fn speak(&self, text: &str) -> Result<AudioBuffer, ConvertError>;
}

/// Converted audio for one analysis window, tagged with the source sample
/// range it came from (at the analysis rate) for stitching.
#[derive(Debug, Clone)]
pub struct ConvertedSegment {
    pub audio: AudioBuffer,
    pub source_start: usize,
    pub source_end: usize,
}

/// Result of a conversion request. A failed mixdown still returns the raw
/// converted vocal, with the mix error attached for the caller to report.
#[derive(Debug)]
pub struct ConversionOutput {
    pub vocal: AudioBuffer,
    pub mix: Option<AudioBuffer>,
    pub mix_error: Option<AudioError>,
}

/// A loaded voice ready to convert audio.
///
/// Accelerator work (pitch, encoder, synthesizer) for all chunks of all
/// requests on this pipeline is serialized behind one async mutex; CPU-side
/// work may interleave freely.
pub struct VoicePipeline {
    estimator: Arc<PitchEstimator>,
    encoder: Arc<FeatureEncoder>,
    synthesizer: Arc<Synthesizer>,
    reference: Option<Arc<FeatureMatrix>>,
    accel: Mutex<()>,
}

impl VoicePipeline {
    pub(crate) fn new(
        estimator: Arc<PitchEstimator>,
        encoder: Arc<FeatureEncoder>,
        synthesizer: Arc<Synthesizer>,
        reference: Option<Arc<FeatureMatrix>>,
    ) -> Self {
        Self {
            estimator,
            encoder,
            synthesizer,
            reference,
            accel: Mutex::new(()),
        }
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.synthesizer.sample_rate()
    }

    /// Converts a recording into the loaded voice. Output is mono at the
    /// voice's sample rate and matches the input duration within one output
    /// frame hop.
    pub async fn convert(
        &self,
        input: &AudioBuffer,
        cfg: &ConversionConfig,
        cancel: &CancelHandle,
    ) -> Result<AudioBuffer, ConvertError> {
        self.convert_windowed(input, cfg, cancel, MAX_WINDOW, OVERLAP)
            .await
    }

    /// `convert` with explicit window geometry, so short inputs can exercise
    /// the multi-window stitching path.
    pub(crate) async fn convert_windowed(
        &self,
        input: &AudioBuffer,
        cfg: &ConversionConfig,
        cancel: &CancelHandle,
        max_window: usize,
        overlap: usize,
    ) -> Result<AudioBuffer, ConvertError> {
        if input.is_empty() {
            return Err(ConvertError::Pitch("input buffer is empty".into()));
        }
        let mono = input.to_mono().resampled(ANALYSIS_SAMPLE_RATE)?;
        let samples = mono.samples();
        let hop_out = self.synthesizer.hop_out();

        let mut stitched: Option<Vec<f32>> = None;
        let mut prev_end = 0usize;
        for (start, end) in plan_windows(samples.len(), max_window, overlap) {
            if cancel.is_cancelled() {
                log::info!("conversion cancelled after {start} samples");
                return Err(ConvertError::Cancelled);
            }
            let segment = self
                .convert_chunk(samples[start..end].to_vec(), start, end, cfg)
                .await?;
            // Overlap comes from the segment tags, not the loop geometry
            let shared = prev_end.saturating_sub(segment.source_start);
            let overlap_out = shared / FRAME_HOP * hop_out;
            prev_end = segment.source_end;
            stitched = Some(match stitched {
                None => segment.audio.samples().to_vec(),
                Some(head) => crossfade_join(head, segment.audio.samples(), overlap_out),
            });
        }

        let samples = stitched.unwrap_or_default();
        Ok(AudioBuffer::mono(samples, self.synthesizer.sample_rate())?)
    }

    /// Converts and then mixes with an optional instrumental. Mix failures
    /// degrade to a vocal-only result instead of failing the request.
    pub async fn convert_with_mix(
        &self,
        input: &AudioBuffer,
        cfg: &ConversionConfig,
        instrumental: Option<&AudioBuffer>,
        mix_cfg: &MixConfig,
        cancel: &CancelHandle,
    ) -> Result<ConversionOutput, ConvertError> {
        let vocal = self.convert(input, cfg, cancel).await?;
        match mix(&vocal, instrumental, mix_cfg) {
            Ok(mixed) => Ok(ConversionOutput {
                vocal,
                mix: Some(mixed),
                mix_error: None,
            }),
            Err(e) => {
                log::warn!("mixdown failed, returning vocal only: {e}");
                Ok(ConversionOutput {
                    vocal,
                    mix: None,
                    mix_error: Some(e),
                })
            }
        }
    }

    /// Synthesizes text with the given engine and converts the result.
    pub async fn convert_text(
        &self,
        engine: &dyn TtsEngine,
        text: &str,
        cfg: &ConversionConfig,
        cancel: &CancelHandle,
    ) -> Result<AudioBuffer, ConvertError> {
        let speech = engine.speak(text)?;
        self.convert(&speech, cfg, cancel).await
    }

    async fn convert_chunk(
        &self,
        chunk: Vec<f32>,
        source_start: usize,
        source_end: usize,
        cfg: &ConversionConfig,
    ) -> Result<ConvertedSegment, ConvertError> {
        let real_len = chunk.len();
        let padded_len = real_len.div_ceil(ENCODER_STRIDE) * ENCODER_STRIDE;
        let mut padded = chunk;
        padded.resize(padded_len, 0.0);

        let estimator = self.estimator.clone();
        let encoder = self.encoder.clone();
        let synthesizer = self.synthesizer.clone();
        let reference = self.reference.clone();
        let cfg = cfg.clone();
        let hop_out = self.synthesizer.hop_out();

        let sample_rate = self.synthesizer.sample_rate();
        let _accel = self.accel.lock().await;
        let audio = tokio::task::spawn_blocking(move || -> Result<AudioBuffer, ConvertError> {
            let contour = estimator.extract(&padded, cfg.f0_min_hz, cfg.f0_max_hz)?;
            let contour = contour.median_filtered(cfg.filter_radius);
            let contour = if cfg.f0_autotune {
                contour.autotuned()
            } else {
                contour
            };

            let features = encoder.encode(&padded)?;
            if features.rows() != contour.len() {
                return Err(ConvertError::Shape(format!(
                    "feature rows {} do not match contour frames {}",
                    features.rows(),
                    contour.len()
                )));
            }
            let features = index::blend(
                &features,
                reference.as_deref(),
                &contour,
                cfg.index_search_ratio,
                cfg.protect_voiceless_ratio,
            )?;

            let audio = synthesizer.synthesize(
                &features,
                &contour,
                cfg.pitch_shift_semitones,
                cfg.f0_min_hz,
                cfg.f0_max_hz,
            )?;
            let mut out = audio.samples().to_vec();
            apply_rms_mix(&mut out, &padded, hop_out, cfg.rms_mix_rate);

            // Drop the samples synthesized from the zero padding
            let expected =
                ((real_len as f64) * hop_out as f64 / FRAME_HOP as f64).round() as usize;
            out.truncate(expected);
            Ok(AudioBuffer::mono(out, sample_rate)?)
        })
        .await
        .map_err(|e| ConvertError::Synthesis(format!("inference task failed: {e}")))??;
        Ok(ConvertedSegment {
            audio,
            source_start,
            source_end,
        })
    }
}

/// Splits `len` samples into windows of at most `max_window`, each sharing
/// `overlap` samples with its predecessor. A single window covers short input
/// exactly.
pub(crate) fn plan_windows(
    len: usize,
    max_window: usize,
    overlap: usize,
) -> Vec<(usize, usize)> {
    if len <= max_window {
        return vec![(0, len)];
    }
    let step = max_window - overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_window).min(len);
        windows.push((start, end));
        if end == len {
            return windows;
        }
        start += step;
    }
}

/// Pulls the output's per-frame loudness toward the source's. `rate == 1`
/// keeps the synthesized envelope untouched.
fn apply_rms_mix(out: &mut [f32], source: &[f32], hop_out: usize, rate: f32) {
    if rate >= 1.0 || hop_out == 0 {
        return;
    }
    let rate = rate.clamp(0.0, 1.0);
    for (frame, window) in out.chunks_mut(hop_out).enumerate() {
        let src_start = frame * FRAME_HOP;
        let src_end = (src_start + FRAME_HOP).min(source.len());
        if src_end <= src_start {
            break;
        }
        let rms_src = rms(&source[src_start..src_end]);
        let rms_out = rms(window);
        let gain = ((rms_src + 1e-6) / (rms_out + 1e-6)).powf(1.0 - rate);
        for s in window.iter_mut() {
            *s *= gain;
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FEATURE_DIM;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn zero_pipeline(reference: Option<FeatureMatrix>) -> VoicePipeline {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let estimator =
            Arc::new(PitchEstimator::from_varbuilder(vb.pp("pitch"), &device).unwrap());
        let encoder =
            Arc::new(FeatureEncoder::from_varbuilder(vb.pp("enc"), &device).unwrap());
        let synthesizer = Arc::new(
            Synthesizer::from_varbuilder(vb, 16000, FEATURE_DIM, &device).unwrap(),
        );
        VoicePipeline::new(estimator, encoder, synthesizer, reference.map(Arc::new))
    }

    fn one_second_tone() -> AudioBuffer {
        let samples: Vec<f32> = (0..16000)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16000.0).sin() * 0.4)
            .collect();
        AudioBuffer::mono(samples, 16000).unwrap()
    }

    #[tokio::test]
    async fn output_duration_matches_input() {
        let pipeline = zero_pipeline(None);
        let out = pipeline
            .convert(
                &one_second_tone(),
                &ConversionConfig::default(),
                &CancelHandle::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.sample_rate(), 16000);
        assert_eq!(out.frames(), 16000);
        assert_eq!(out.channels(), 1);
    }

    #[tokio::test]
    async fn zero_ratio_ignores_the_reference() {
        let reference = FeatureMatrix::new(FEATURE_DIM, vec![0.5; FEATURE_DIM * 4]).unwrap();
        let with_index = zero_pipeline(Some(reference));
        let without_index = zero_pipeline(None);
        let cfg = ConversionConfig::default();
        let cancel = CancelHandle::new();

        let input = one_second_tone();
        let a = with_index.convert(&input, &cfg, &cancel).await.unwrap();
        let b = without_index.convert(&input, &cfg, &cancel).await.unwrap();
        assert_eq!(a.samples(), b.samples());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let pipeline = zero_pipeline(None);
        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = pipeline
            .convert(&one_second_tone(), &ConversionConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let pipeline = zero_pipeline(None);
        let input = AudioBuffer::mono(vec![], 16000).unwrap();
        let err = pipeline
            .convert(&input, &ConversionConfig::default(), &CancelHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Pitch(_)));
    }

    #[tokio::test]
    async fn multi_window_output_duration_matches_input() {
        let pipeline = zero_pipeline(None);
        let input = one_second_tone();
        // Shrunken window geometry forces five overlapping chunks
        let max_window = 4800;
        let overlap = 1600;
        assert!(plan_windows(input.frames(), max_window, overlap).len() > 1);

        let out = pipeline
            .convert_windowed(
                &input,
                &ConversionConfig::default(),
                &CancelHandle::new(),
                max_window,
                overlap,
            )
            .await
            .unwrap();

        let hop_out = 160i64;
        let expected = input.frames() as i64;
        assert!(
            (out.frames() as i64 - expected).abs() <= hop_out,
            "stitched {} frames, expected {expected} within one hop",
            out.frames()
        );
    }

    #[tokio::test]
    async fn convert_with_mix_sums_the_instrumental() {
        let pipeline = zero_pipeline(None);
        let inst = AudioBuffer::mono(vec![0.1; 16000], 16000).unwrap();
        let out = pipeline
            .convert_with_mix(
                &one_second_tone(),
                &ConversionConfig::default(),
                Some(&inst),
                &MixConfig::default(),
                &CancelHandle::new(),
            )
            .await
            .unwrap();
        assert!(out.mix.is_some());
        assert!(out.mix_error.is_none());
        assert_eq!(out.vocal.frames(), 16000);
    }

    #[test]
    fn window_plan_covers_input_exactly() {
        let plan = plan_windows(100, 100, 10);
        assert_eq!(plan, vec![(0, 100)]);

        let plan = plan_windows(250, 100, 10);
        assert_eq!(plan.first(), Some(&(0, 100)));
        assert_eq!(plan.last().map(|w| w.1), Some(250));
        for pair in plan.windows(2) {
            assert_eq!(pair[0].1 - pair[1].0, 10, "overlap must be constant");
        }
    }

    #[test]
    fn stitched_length_matches_window_plan() {
        // Simulate chunk trimming + crossfade arithmetic for a 45 s input
        let len = 45 * 16000;
        let hop_out = 400; // 40 kHz voice
        let plan = plan_windows(len, MAX_WINDOW, OVERLAP);
        assert!(plan.len() > 1);
        let overlap_out = OVERLAP / FRAME_HOP * hop_out;
        let mut total = 0usize;
        for (i, (start, end)) in plan.iter().enumerate() {
            let out = ((end - start) as f64 * hop_out as f64 / FRAME_HOP as f64).round()
                as usize;
            total += out;
            if i > 0 {
                total -= overlap_out;
            }
        }
        let expected = (len as f64 * hop_out as f64 / FRAME_HOP as f64).round() as usize;
        assert!((total as i64 - expected as i64).unsigned_abs() as usize <= hop_out);
    }

    #[test]
    fn rms_mix_pulls_toward_source_level() {
        let mut out = vec![0.1f32; 160];
        let source = vec![0.8f32; 160];
        apply_rms_mix(&mut out, &source, 160, 0.0);
        // Fully mixed: the output frame takes on the source's RMS
        let r = rms(&out);
        assert!((r - 0.8).abs() < 0.01, "rms was {r}");
    }

    #[test]
    fn rms_mix_at_one_is_identity() {
        let mut out = vec![0.1f32; 160];
        let source = vec![0.8f32; 160];
        apply_rms_mix(&mut out, &source, 160, 1.0);
        assert!(out.iter().all(|&s| (s - 0.1).abs() < 1e-9));
    }
}
