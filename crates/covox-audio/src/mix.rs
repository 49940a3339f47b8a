//! Final mixdown of the converted vocal with an optional instrumental stem.

use crate::effects::{apply_chain, EffectConfig};
use crate::{AudioBuffer, AudioError};
use serde::Deserialize;

/// What to do when the stems have different lengths after alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Cut the mix at the end of the shorter stem.
    TrimToShorter,
    /// Keep the longer stem's excess, with the shorter stem padded out.
    KeepLonger,
}

impl Default for TailPolicy {
    fn default() -> Self {
        TailPolicy::TrimToShorter
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MixConfig {
    #[serde(default)]
    pub vocal_gain_db: f32,
    #[serde(default)]
    pub instrumental_gain_db: f32,
    #[serde(default)]
    pub tail: TailPolicy,
    /// Effects applied to the vocal stem before summing.
    #[serde(default)]
    pub effects: Vec<EffectConfig>,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            vocal_gain_db: 0.0,
            instrumental_gain_db: 0.0,
            tail: TailPolicy::default(),
            effects: Vec::new(),
        }
    }
}

/// Mix the converted vocal with an optional instrumental.
///
/// The instrumental is resampled to the vocal's rate before summing; a rate
/// mismatch is never resolved by truncation. Channel layouts are aligned by
/// upmixing mono to the wider layout; two differing multi-channel layouts are
/// an alignment error.
pub fn mix(
    vocal: &AudioBuffer,
    instrumental: Option<&AudioBuffer>,
    cfg: &MixConfig,
) -> Result<AudioBuffer, AudioError> {
    let vocal = apply_chain(vocal, &cfg.effects).with_gain_db(cfg.vocal_gain_db);

    let Some(instrumental) = instrumental else {
        return Ok(vocal);
    };

    if instrumental.sample_rate() == 0 {
        return Err(AudioError::MixAlignment(
            "instrumental has zero sample rate".into(),
        ));
    }

    let instrumental = instrumental
        .resampled(vocal.sample_rate())
        .map_err(|e| AudioError::MixAlignment(format!("resampling instrumental failed: {e}")))?
        .with_gain_db(cfg.instrumental_gain_db);

    let channels = vocal.channels().max(instrumental.channels());
    let vocal = vocal.upmixed(channels).map_err(|e| {
        AudioError::MixAlignment(format!("cannot align vocal channel layout: {e}"))
    })?;
    let instrumental = instrumental.upmixed(channels).map_err(|e| {
        AudioError::MixAlignment(format!("cannot align instrumental channel layout: {e}"))
    })?;

    let frames = match cfg.tail {
        TailPolicy::TrimToShorter => vocal.frames().min(instrumental.frames()),
        TailPolicy::KeepLonger => vocal.frames().max(instrumental.frames()),
    };

    let mut out = vec![0.0f32; frames * channels];
    sum_into(&mut out, vocal.samples());
    sum_into(&mut out, instrumental.samples());

    AudioBuffer::new(out, vocal.sample_rate(), channels)
}

fn sum_into(out: &mut [f32], stem: &[f32]) {
    for (o, s) in out.iter_mut().zip(stem) {
        *o += s;
    }
}
