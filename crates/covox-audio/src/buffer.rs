use crate::AudioError;

/// Immutable PCM audio: interleaved f32 samples plus sample rate and channel
/// count. Every transform returns a new buffer.
#[derive(Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::Buffer("sample rate must be non-zero".into()));
        }
        if channels == 0 {
            return Err(AudioError::Buffer("channel count must be non-zero".into()));
        }
        if samples.len() % channels != 0 {
            return Err(AudioError::Buffer(format!(
                "sample count {} is not a multiple of channel count {}",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        Self::new(samples, sample_rate, 1)
    }

    pub fn silence(frames: usize, sample_rate: u32, channels: usize) -> Result<Self, AudioError> {
        Self::new(vec![0.0; frames * channels], sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frame count (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Downmix to mono by averaging channels.
    pub fn to_mono(&self) -> AudioBuffer {
        if self.channels == 1 {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.frames());
        for frame in self.samples.chunks_exact(self.channels) {
            out.push(frame.iter().sum::<f32>() / self.channels as f32);
        }
        AudioBuffer {
            samples: out,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Duplicate a mono buffer across `channels` channels.
    pub fn upmixed(&self, channels: usize) -> Result<AudioBuffer, AudioError> {
        if self.channels == channels {
            return Ok(self.clone());
        }
        if self.channels != 1 {
            return Err(AudioError::Buffer(format!(
                "cannot upmix {} channels to {}",
                self.channels, channels
            )));
        }
        let mut out = Vec::with_capacity(self.samples.len() * channels);
        for &s in &self.samples {
            for _ in 0..channels {
                out.push(s);
            }
        }
        AudioBuffer::new(out, self.sample_rate, channels)
    }

    /// Resample to `dst_rate` by linear interpolation, per channel.
    pub fn resampled(&self, dst_rate: u32) -> Result<AudioBuffer, AudioError> {
        if dst_rate == 0 {
            return Err(AudioError::Buffer("target sample rate must be non-zero".into()));
        }
        if dst_rate == self.sample_rate || self.is_empty() {
            let mut out = self.clone();
            out.sample_rate = dst_rate;
            return Ok(out);
        }

        let src_frames = self.frames();
        let ratio = dst_rate as f64 / self.sample_rate as f64;
        let dst_frames = ((src_frames as f64) * ratio).round().max(1.0) as usize;
        let mut out = Vec::with_capacity(dst_frames * self.channels);

        for i in 0..dst_frames {
            let pos = i as f64 / ratio;
            let left = pos.floor() as usize;
            let right = (left + 1).min(src_frames - 1);
            let frac = (pos - left as f64) as f32;
            for c in 0..self.channels {
                let a = self.samples[left * self.channels + c];
                let b = self.samples[right * self.channels + c];
                out.push(a + (b - a) * frac);
            }
        }

        AudioBuffer::new(out, dst_rate, self.channels)
    }

    /// Copy of the frame range `[start, end)`.
    pub fn slice_frames(&self, start: usize, end: usize) -> Result<AudioBuffer, AudioError> {
        let frames = self.frames();
        if start > end || end > frames {
            return Err(AudioError::Buffer(format!(
                "slice [{start}, {end}) out of range for {frames} frames"
            )));
        }
        AudioBuffer::new(
            self.samples[start * self.channels..end * self.channels].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Apply a gain in decibels.
    pub fn with_gain_db(&self, db: f32) -> AudioBuffer {
        let gain = db_to_amplitude(db);
        AudioBuffer {
            samples: self.samples.iter().map(|s| s * gain).collect(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Scale so the peak lands at `target_peak`. Silence is returned as-is.
    pub fn peak_normalized(&self, target_peak: f32) -> AudioBuffer {
        let peak = self.peak();
        if peak <= f32::EPSILON {
            return self.clone();
        }
        let gain = target_peak / peak;
        AudioBuffer {
            samples: self.samples.iter().map(|s| s * gain).collect(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

pub fn db_to_amplitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Join two mono sample runs with a linear crossfade over `overlap` samples.
///
/// The tail of `head` fades out while the head of `tail` fades in; the
/// result has length `head.len() + tail.len() - overlap`. With `overlap == 0`
/// this is plain concatenation.
pub fn crossfade_join(mut head: Vec<f32>, tail: &[f32], overlap: usize) -> Vec<f32> {
    let overlap = overlap.min(head.len()).min(tail.len());
    let fade_start = head.len() - overlap;

    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap + 1) as f32;
        head[fade_start + i] = head[fade_start + i] * (1.0 - t) + tail[i] * t;
    }
    head.extend_from_slice(&tail[overlap..]);
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_ragged_interleave() {
        assert!(AudioBuffer::new(vec![0.0; 3], 16000, 2).is_err());
    }

    #[test]
    fn to_mono_averages() {
        let b = AudioBuffer::new(vec![1.0, 0.0, 0.0, 1.0], 16000, 2).unwrap();
        let m = b.to_mono();
        assert_eq!(m.channels(), 1);
        assert_eq!(m.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn resample_preserves_duration() {
        let b = AudioBuffer::mono(vec![0.0; 16000], 16000).unwrap();
        let r = b.resampled(40000).unwrap();
        assert_eq!(r.frames(), 40000);
        assert!((r.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resample_identity_rate() {
        let b = AudioBuffer::mono(vec![0.5, -0.5], 16000).unwrap();
        assert_eq!(b.resampled(16000).unwrap().samples(), b.samples());
    }

    #[test]
    fn crossfade_join_length() {
        let head = vec![1.0; 100];
        let tail = vec![0.0; 100];
        let joined = crossfade_join(head, &tail, 20);
        assert_eq!(joined.len(), 180);
    }

    #[test]
    fn crossfade_join_is_monotone_blend() {
        let head = vec![1.0; 10];
        let tail = vec![0.0; 10];
        let joined = crossfade_join(head, &tail, 10);
        // Fade region decreases from head level toward tail level
        for w in joined.windows(2) {
            assert!(w[1] <= w[0] + 1e-6);
        }
    }

    #[test]
    fn gain_db_doubles_at_six_db() {
        let b = AudioBuffer::mono(vec![0.25], 16000).unwrap();
        let g = b.with_gain_db(6.0);
        assert!((g.samples()[0] - 0.25 * db_to_amplitude(6.0)).abs() < 1e-7);
        assert!((db_to_amplitude(6.0) - 1.9953).abs() < 1e-3);
    }

    #[test]
    fn slice_frames_bounds() {
        let b = AudioBuffer::mono((0..10).map(|i| i as f32).collect(), 16000).unwrap();
        let s = b.slice_frames(2, 5).unwrap();
        assert_eq!(s.samples(), &[2.0, 3.0, 4.0]);
        assert!(b.slice_frames(8, 12).is_err());
    }
}
