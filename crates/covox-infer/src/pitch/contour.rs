//! Frame-aligned pitch contours.

/// One analysis frame of the pitch track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchFrame {
    Voiced(f32),
    Unvoiced,
}

impl PitchFrame {
    pub fn hz(&self) -> Option<f32> {
        match self {
            PitchFrame::Voiced(hz) => Some(*hz),
            PitchFrame::Unvoiced => None,
        }
    }

    pub fn is_voiced(&self) -> bool {
        matches!(self, PitchFrame::Voiced(_))
    }
}

/// Pitch contour at the analysis frame rate (one frame per hop).
#[derive(Debug, Clone)]
pub struct PitchContour {
    frames: Vec<PitchFrame>,
}

impl PitchContour {
    pub fn new(frames: Vec<PitchFrame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[PitchFrame] {
        &self.frames
    }

    /// Transposes voiced frames by `semitones`. Unvoiced frames are untouched.
    pub fn transposed(&self, semitones: i32) -> Self {
        if semitones == 0 {
            return self.clone();
        }
        let factor = 2.0f32.powf(semitones as f32 / 12.0);
        let frames = self
            .frames
            .iter()
            .map(|f| match f {
                PitchFrame::Voiced(hz) => PitchFrame::Voiced(hz * factor),
                PitchFrame::Unvoiced => PitchFrame::Unvoiced,
            })
            .collect();
        Self { frames }
    }

    /// Median filter over voiced runs. Windows never cross a voicing boundary,
    /// so a consonant gap cannot pull a vowel's pitch toward zero.
    pub fn median_filtered(&self, radius: usize) -> Self {
        if radius == 0 || self.frames.len() < 3 {
            return self.clone();
        }
        let mut frames = self.frames.clone();
        for i in 0..self.frames.len() {
            if !self.frames[i].is_voiced() {
                continue;
            }
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(self.frames.len());
            let mut window: Vec<f32> = self.frames[lo..hi]
                .iter()
                .filter_map(|f| f.hz())
                .collect();
            if window.len() < 2 {
                continue;
            }
            window.sort_by(|a, b| a.total_cmp(b));
            let mid = window.len() / 2;
            let median = if window.len() % 2 == 1 {
                window[mid]
            } else {
                (window[mid - 1] + window[mid]) / 2.0
            };
            frames[i] = PitchFrame::Voiced(median);
        }
        Self { frames }
    }

    /// Snaps voiced frames to the nearest equal-temperament semitone (A4 = 440).
    pub fn autotuned(&self) -> Self {
        let frames = self
            .frames
            .iter()
            .map(|f| match f {
                PitchFrame::Voiced(hz) if *hz > 0.0 => {
                    let midi = 69.0 + 12.0 * (hz / 440.0).log2();
                    PitchFrame::Voiced(440.0 * 2.0f32.powf((midi.round() - 69.0) / 12.0))
                }
                other => *other,
            })
            .collect();
        Self { frames }
    }

    /// Coarse 1..=255 pitch codes for the synthesizer's pitch embedding.
    /// 0 marks unvoiced frames.
    pub fn coarse(&self, f0_min: f32, f0_max: f32) -> Vec<u32> {
        let mel_min = 1127.0 * (1.0 + f0_min / 700.0).ln();
        let mel_max = 1127.0 * (1.0 + f0_max / 700.0).ln();
        self.frames
            .iter()
            .map(|f| match f {
                PitchFrame::Voiced(hz) => {
                    let mel = 1127.0 * (1.0 + hz / 700.0).ln();
                    let scaled = (mel - mel_min) * 254.0 / (mel_max - mel_min) + 1.0;
                    scaled.round().clamp(1.0, 255.0) as u32
                }
                PitchFrame::Unvoiced => 0,
            })
            .collect()
    }

    /// Per-frame frequencies with unvoiced frames as 0.0, for the sine source.
    pub fn to_hz(&self) -> Vec<f32> {
        self.frames
            .iter()
            .map(|f| f.hz().unwrap_or(0.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(hz: &[f32]) -> PitchContour {
        PitchContour::new(hz.iter().map(|&h| PitchFrame::Voiced(h)).collect())
    }

    #[test]
    fn transpose_octave_doubles() {
        let c = voiced(&[220.0, 440.0]).transposed(12);
        assert!((c.frames()[0].hz().unwrap() - 440.0).abs() < 1e-3);
        assert!((c.frames()[1].hz().unwrap() - 880.0).abs() < 1e-3);
    }

    #[test]
    fn transpose_skips_unvoiced() {
        let c = PitchContour::new(vec![PitchFrame::Unvoiced, PitchFrame::Voiced(100.0)]);
        let t = c.transposed(-12);
        assert_eq!(t.frames()[0], PitchFrame::Unvoiced);
        assert!((t.frames()[1].hz().unwrap() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn median_filter_removes_spike() {
        let c = voiced(&[200.0, 200.0, 600.0, 200.0, 200.0]).median_filtered(2);
        assert!((c.frames()[2].hz().unwrap() - 200.0).abs() < 1e-3);
    }

    #[test]
    fn median_filter_ignores_unvoiced_neighbors() {
        let c = PitchContour::new(vec![
            PitchFrame::Unvoiced,
            PitchFrame::Voiced(300.0),
            PitchFrame::Unvoiced,
        ])
        .median_filtered(1);
        assert!((c.frames()[1].hz().unwrap() - 300.0).abs() < 1e-3);
        assert_eq!(c.frames()[0], PitchFrame::Unvoiced);
    }

    #[test]
    fn autotune_snaps_to_a4() {
        let c = voiced(&[438.0]).autotuned();
        assert!((c.frames()[0].hz().unwrap() - 440.0).abs() < 1e-2);
    }

    #[test]
    fn coarse_codes_span_range() {
        let c = PitchContour::new(vec![
            PitchFrame::Voiced(50.0),
            PitchFrame::Voiced(1100.0),
            PitchFrame::Unvoiced,
        ]);
        let codes = c.coarse(50.0, 1100.0);
        assert_eq!(codes, vec![1, 255, 0]);
    }
}
