use serde::Deserialize;

/// Per-request conversion settings.
///
/// Defaults mirror the product's conversion tab.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Transpose applied to the pitch contour before synthesis conditioning.
    pub pitch_shift_semitones: i32,
    /// Blend weight toward nearest-neighbor reference features, in [0, 1].
    /// 0 disables index lookup entirely.
    pub index_search_ratio: f32,
    /// Damps index blending on unvoiced frames to keep consonants crisp.
    /// On unvoiced frames the effective blend is
    /// `index_search_ratio * (1 - protect_voiceless_ratio)`.
    pub protect_voiceless_ratio: f32,
    /// Median filter radius on the pitch contour; 0 disables smoothing.
    pub filter_radius: usize,
    /// Blend between the synthesized loudness envelope and the input's.
    /// 1 keeps the synthesized envelope untouched.
    pub rms_mix_rate: f32,
    /// Snap voiced frames to the nearest equal-temperament semitone.
    pub f0_autotune: bool,
    /// Pitch search range, in Hz.
    pub f0_min_hz: f32,
    pub f0_max_hz: f32,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            pitch_shift_semitones: 0,
            index_search_ratio: 0.0,
            protect_voiceless_ratio: 0.33,
            filter_radius: 3,
            rms_mix_rate: 1.0,
            f0_autotune: false,
            f0_min_hz: 50.0,
            f0_max_hz: 1100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_tab() {
        let cfg = ConversionConfig::default();
        assert_eq!(cfg.pitch_shift_semitones, 0);
        assert_eq!(cfg.index_search_ratio, 0.0);
        assert_eq!(cfg.filter_radius, 3);
        assert!((cfg.protect_voiceless_ratio - 0.33).abs() < 1e-6);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ConversionConfig =
            serde_json::from_str(r#"{"pitch_shift_semitones": 12}"#).unwrap();
        assert_eq!(cfg.pitch_shift_semitones, 12);
        assert_eq!(cfg.filter_radius, 3);
    }
}
