// src/dsp/mod.rs
//
// DSP building blocks used by voices.

mod effects;
mod envelope;
mod filters;
mod oscillators;
mod pluck;

pub use effects::*;
pub use envelope::*;
pub use filters::*;
pub use oscillators::*;
pub use pluck::*;

use crate::config::{A4_FREQ, A4_MIDI};

/// MIDI pitch to frequency in Hz (A4 = 69 = 440 Hz).
#[inline]
pub fn pitch_to_freq(pitch: u8) -> f32 {
    A4_FREQ * 2.0_f32.powf((pitch as f32 - A4_MIDI as f32) / 12.0)
}

/// Map a normalised 0..=1 value onto an exponential range.
#[inline]
pub fn scale_log(value: f32, min: f32, max: f32) -> f32 {
    min * (max / min).powf(value.clamp(0.0, 1.0))
}

/// Equal-power pan gains for a 0..=1 position (0.5 = centre).
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = pan.clamp(0.0, 1.0) * std::f32::consts::FRAC_PI_2;
    (angle.cos(), angle.sin())
}

// ═══════════════════════════════════════════════════════════════════
// Parameter smoothing
// ═══════════════════════════════════════════════════════════════════

/// One-pole smoother for live parameter changes.
#[derive(Debug, Clone, Copy)]
pub struct Smoother {
    value: f32,
    coeff: f32,
}

impl Smoother {
    /// `time` is the time constant in seconds.
    pub fn new(time: f32, sample_rate: f32) -> Self {
        Self {
            value: 0.0,
            coeff: 1.0 - (-1.0 / (time * sample_rate).max(1.0)).exp(),
        }
    }

    /// Jump straight to `value`.
    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.value += (target - self.value) * self.coeff;
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }
}

// ═══════════════════════════════════════════════════════════════════
// Noise
// ═══════════════════════════════════════════════════════════════════

/// Deterministic xorshift white noise.
///
/// Seeded per voice so identical scores render identical audio.
#[derive(Debug, Clone, Copy)]
pub struct Noise {
    state: u32,
}

impl Noise {
    pub fn new(seed: u32) -> Self {
        Self {
            state: seed.wrapping_mul(0x9E37_79B9) | 1,
        }
    }

    /// Next sample in -1..1.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x >> 8) as f32 / (1u32 << 23) as f32 - 1.0
    }
}
