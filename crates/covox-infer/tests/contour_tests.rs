//! Pitch contour behavior observable through the public API.

use covox_infer::synth::sine_source;
use covox_infer::{ConversionConfig, PitchContour, PitchFrame};

fn zero_crossings(signal: &[f32]) -> usize {
    signal
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count()
}

#[test]
fn octave_transpose_doubles_the_excitation_frequency() {
    let contour = PitchContour::new(vec![PitchFrame::Voiced(110.0); 200]);
    let shifted = contour.transposed(12);

    let base = sine_source(&contour.to_hz(), 160, 16000);
    let up = sine_source(&shifted.to_hz(), 160, 16000);

    let ratio = zero_crossings(&up) as f32 / zero_crossings(&base) as f32;
    assert!((ratio - 2.0).abs() < 0.1, "crossing ratio was {ratio}");
}

#[test]
fn transpose_round_trip_restores_the_contour() {
    let contour = PitchContour::new(vec![
        PitchFrame::Voiced(196.0),
        PitchFrame::Unvoiced,
        PitchFrame::Voiced(247.0),
    ]);
    let back = contour.transposed(7).transposed(-7);
    for (a, b) in contour.frames().iter().zip(back.frames()) {
        match (a, b) {
            (PitchFrame::Voiced(x), PitchFrame::Voiced(y)) => {
                assert!((x - y).abs() < 1e-3)
            }
            (PitchFrame::Unvoiced, PitchFrame::Unvoiced) => {}
            _ => panic!("voicing changed under transpose"),
        }
    }
}

#[test]
fn coarse_codes_reserve_zero_for_unvoiced() {
    let cfg = ConversionConfig::default();
    let contour = PitchContour::new(vec![
        PitchFrame::Unvoiced,
        PitchFrame::Voiced(220.0),
        PitchFrame::Voiced(880.0),
    ]);
    let codes = contour.coarse(cfg.f0_min_hz, cfg.f0_max_hz);
    assert_eq!(codes[0], 0);
    assert!(codes[1] >= 1 && codes[2] <= 255);
    assert!(codes[1] < codes[2]);
}

#[test]
fn config_json_round_trip_keeps_unset_defaults() {
    let cfg: ConversionConfig = serde_json::from_str(
        r#"{"index_search_ratio": 0.75, "f0_autotune": true}"#,
    )
    .unwrap();
    assert!((cfg.index_search_ratio - 0.75).abs() < 1e-6);
    assert!(cfg.f0_autotune);
    assert_eq!(cfg.pitch_shift_semitones, 0);
    assert!((cfg.rms_mix_rate - 1.0).abs() < 1e-6);
}
