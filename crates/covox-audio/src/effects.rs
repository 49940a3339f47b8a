//! Post-processing effects applied to the converted vocal before mixing.
//!
//! Each effect is a stateless transform: all filter state lives for the
//! duration of a single `apply` call. The chain runs in the order given.

use crate::AudioBuffer;
use serde::Deserialize;
use std::f32::consts::PI;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectConfig {
    Reverb {
        room_size: f32,
        damping: f32,
        wet: f32,
        dry: f32,
        width: f32,
    },
    LowShelf {
        cutoff_hz: f32,
        gain_db: f32,
    },
    HighShelf {
        cutoff_hz: f32,
        gain_db: f32,
    },
    Compressor {
        threshold_db: f32,
        ratio: f32,
    },
    NoiseGate {
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
    },
    Chorus {
        rate_hz: f32,
        depth: f32,
        centre_delay_ms: f32,
        feedback: f32,
        mix: f32,
    },
}

impl EffectConfig {
    pub fn apply(&self, buf: &AudioBuffer) -> AudioBuffer {
        match *self {
            EffectConfig::Reverb {
                room_size,
                damping,
                wet,
                dry,
                width,
            } => per_channel(buf, |ch, sr| reverb(ch, sr, room_size, damping, wet, dry, width)),
            EffectConfig::LowShelf { cutoff_hz, gain_db } => {
                per_channel(buf, |ch, sr| biquad(ch, shelf_coeffs(sr, cutoff_hz, gain_db, false)))
            }
            EffectConfig::HighShelf { cutoff_hz, gain_db } => {
                per_channel(buf, |ch, sr| biquad(ch, shelf_coeffs(sr, cutoff_hz, gain_db, true)))
            }
            EffectConfig::Compressor {
                threshold_db,
                ratio,
            } => per_channel(buf, |ch, sr| compressor(ch, sr, threshold_db, ratio)),
            EffectConfig::NoiseGate {
                threshold_db,
                ratio,
                attack_ms,
                release_ms,
            } => per_channel(buf, |ch, sr| {
                noise_gate(ch, sr, threshold_db, ratio, attack_ms, release_ms)
            }),
            EffectConfig::Chorus {
                rate_hz,
                depth,
                centre_delay_ms,
                feedback,
                mix,
            } => per_channel(buf, |ch, sr| {
                chorus(ch, sr, rate_hz, depth, centre_delay_ms, feedback, mix)
            }),
        }
    }
}

/// Run the whole chain in order.
pub fn apply_chain(buf: &AudioBuffer, chain: &[EffectConfig]) -> AudioBuffer {
    let mut out = buf.clone();
    for effect in chain {
        out = effect.apply(&out);
    }
    out
}

fn per_channel(buf: &AudioBuffer, f: impl Fn(&[f32], u32) -> Vec<f32>) -> AudioBuffer {
    let channels = buf.channels();
    let frames = buf.frames();
    let src = buf.samples();

    let mut out = vec![0.0f32; src.len()];
    for c in 0..channels {
        let ch: Vec<f32> = (0..frames).map(|i| src[i * channels + c]).collect();
        let processed = f(&ch, buf.sample_rate());
        for (i, &s) in processed.iter().take(frames).enumerate() {
            out[i * channels + c] = s;
        }
    }

    AudioBuffer::new(out, buf.sample_rate(), channels).unwrap_or_else(|e| {
        log::warn!("effect produced an invalid buffer ({e}); passing input through");
        buf.clone()
    })
}

struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

// RBJ audio EQ cookbook shelving filters, slope = 1.
fn shelf_coeffs(sample_rate: u32, cutoff_hz: f32, gain_db: f32, high: bool) -> BiquadCoeffs {
    let a = 10.0_f32.powf(gain_db / 40.0);
    let w0 = 2.0 * PI * cutoff_hz / sample_rate as f32;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let alpha = sin_w0 / 2.0 * 2.0_f32.sqrt();
    let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

    let (b0, b1, b2, a0, a1, a2) = if high {
        (
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    } else {
        (
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    };

    BiquadCoeffs {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

fn biquad(ch: &[f32], c: BiquadCoeffs) -> Vec<f32> {
    let mut out = Vec::with_capacity(ch.len());
    let (mut x1, mut x2, mut y1, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for &x in ch {
        let y = c.b0 * x + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
        x2 = x1;
        x1 = x;
        y2 = y1;
        y1 = y;
        out.push(y);
    }
    out
}

// Freeverb-style comb and allpass tunings, scaled from 44.1 kHz.
const COMB_TUNINGS: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNINGS: [usize; 2] = [556, 441];

fn reverb(
    ch: &[f32],
    sample_rate: u32,
    room_size: f32,
    damping: f32,
    wet: f32,
    dry: f32,
    width: f32,
) -> Vec<f32> {
    let scale = sample_rate as f32 / 44100.0;
    let feedback = 0.7 + room_size.clamp(0.0, 1.0) * 0.28;
    let damp = damping.clamp(0.0, 1.0) * 0.4;
    let wet = wet.clamp(0.0, 1.0) * (0.5 + width.clamp(0.0, 1.0) * 0.5);

    struct Comb {
        buf: Vec<f32>,
        pos: usize,
        filter_store: f32,
    }

    let mut combs: Vec<Comb> = COMB_TUNINGS
        .iter()
        .map(|&t| Comb {
            buf: vec![0.0; ((t as f32 * scale) as usize).max(1)],
            pos: 0,
            filter_store: 0.0,
        })
        .collect();

    let mut allpasses: Vec<(Vec<f32>, usize)> = ALLPASS_TUNINGS
        .iter()
        .map(|&t| (vec![0.0; ((t as f32 * scale) as usize).max(1)], 0))
        .collect();

    let mut out = Vec::with_capacity(ch.len());
    for &x in ch {
        let input = x * 0.015;
        let mut acc = 0.0f32;
        for comb in &mut combs {
            let delayed = comb.buf[comb.pos];
            comb.filter_store = delayed * (1.0 - damp) + comb.filter_store * damp;
            comb.buf[comb.pos] = input + comb.filter_store * feedback;
            comb.pos = (comb.pos + 1) % comb.buf.len();
            acc += delayed;
        }
        for (buf, pos) in &mut allpasses {
            let delayed = buf[*pos];
            let y = -acc + delayed;
            buf[*pos] = acc + delayed * 0.5;
            *pos = (*pos + 1) % buf.len();
            acc = y;
        }
        out.push(x * dry + acc * wet);
    }
    out
}

fn envelope_coeff(ms: f32, sample_rate: u32) -> f32 {
    if ms <= 0.0 {
        return 0.0;
    }
    (-1.0 / (ms * 1e-3 * sample_rate as f32)).exp()
}

fn amplitude_to_db(a: f32) -> f32 {
    20.0 * a.max(1e-10).log10()
}

fn compressor(ch: &[f32], sample_rate: u32, threshold_db: f32, ratio: f32) -> Vec<f32> {
    let ratio = ratio.max(1.0);
    let attack = envelope_coeff(5.0, sample_rate);
    let release = envelope_coeff(50.0, sample_rate);

    let mut env = 0.0f32;
    let mut out = Vec::with_capacity(ch.len());
    for &x in ch {
        let level = x.abs();
        let coeff = if level > env { attack } else { release };
        env = level + coeff * (env - level);

        let env_db = amplitude_to_db(env);
        let gain_db = if env_db > threshold_db {
            (threshold_db - env_db) * (1.0 - 1.0 / ratio)
        } else {
            0.0
        };
        out.push(x * 10.0_f32.powf(gain_db / 20.0));
    }
    out
}

fn noise_gate(
    ch: &[f32],
    sample_rate: u32,
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
) -> Vec<f32> {
    let ratio = ratio.max(1.0);
    let attack = envelope_coeff(attack_ms, sample_rate);
    let release = envelope_coeff(release_ms, sample_rate);

    let mut env = 0.0f32;
    let mut out = Vec::with_capacity(ch.len());
    for &x in ch {
        let level = x.abs();
        let coeff = if level > env { attack } else { release };
        env = level + coeff * (env - level);

        let env_db = amplitude_to_db(env);
        // Downward expansion below the threshold
        let gain_db = if env_db < threshold_db {
            ((env_db - threshold_db) * (ratio - 1.0)).max(-80.0)
        } else {
            0.0
        };
        out.push(x * 10.0_f32.powf(gain_db / 20.0));
    }
    out
}

fn chorus(
    ch: &[f32],
    sample_rate: u32,
    rate_hz: f32,
    depth: f32,
    centre_delay_ms: f32,
    feedback: f32,
    mix: f32,
) -> Vec<f32> {
    if rate_hz <= 0.0 || centre_delay_ms <= 0.0 || mix <= 0.0 {
        return ch.to_vec();
    }

    let centre = centre_delay_ms * 1e-3 * sample_rate as f32;
    let max_delay = (centre * 2.0) as usize + 2;
    let mut delay_line = vec![0.0f32; max_delay.max(2)];
    let mut write = 0usize;
    let feedback = feedback.clamp(0.0, 0.95);
    let mix = mix.clamp(0.0, 1.0);
    let depth = depth.clamp(0.0, 1.0);

    let mut out = Vec::with_capacity(ch.len());
    for (n, &x) in ch.iter().enumerate() {
        let lfo = (2.0 * PI * rate_hz * n as f32 / sample_rate as f32).sin();
        let delay = (centre * (1.0 + depth * 0.5 * lfo)).clamp(1.0, (max_delay - 2) as f32);

        let read = write as f32 - delay;
        let read = if read < 0.0 {
            read + max_delay as f32
        } else {
            read
        };
        let i0 = read.floor() as usize % max_delay;
        let i1 = (i0 + 1) % max_delay;
        let frac = read - read.floor();
        let delayed = delay_line[i0] * (1.0 - frac) + delay_line[i1] * frac;

        delay_line[write] = x + delayed * feedback;
        write = (write + 1) % max_delay;

        out.push(x * (1.0 - mix) + delayed * mix);
    }
    out
}
