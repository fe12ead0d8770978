// src/dsp/effects.rs
//
// Master bus effects. Every buffer is sized at construction.

use super::SvfFilter;
use crate::config::{EffectsConfig, MAX_DELAY_SECS};

// ═══════════════════════════════════════════════════════════════════
// Delay
// ═══════════════════════════════════════════════════════════════════

/// Feedback delay line returning only the wet signal.
#[derive(Debug)]
pub struct Delay {
    buffer: Box<[f32]>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f32,
}

impl Delay {
    /// `time` in seconds, clamped to `MAX_DELAY_SECS`.
    pub fn new(time: f32, feedback: f32, sample_rate: f32) -> Self {
        let len = (MAX_DELAY_SECS * sample_rate) as usize + 1;
        let delay_samples = ((time.clamp(0.0, MAX_DELAY_SECS) * sample_rate).round() as usize)
            .clamp(1, len - 1);
        Self {
            buffer: vec![0.0; len].into_boxed_slice(),
            write_pos: 0,
            delay_samples,
            feedback: feedback.clamp(0.0, 0.95),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let len = self.buffer.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;
        let delayed = self.buffer[read_pos];

        self.buffer[self.write_pos] = input + delayed * self.feedback;
        self.write_pos = (self.write_pos + 1) % len;

        delayed
    }
}

// ═══════════════════════════════════════════════════════════════════
// Reverb (Schroeder: 4 parallel combs, 2 series allpasses)
// ═══════════════════════════════════════════════════════════════════

// Delay lengths at 48 kHz, scaled to the engine rate.
const COMB_DELAYS: [usize; 4] = [1557, 1617, 1491, 1422];
const ALLPASS_DELAYS: [usize; 2] = [225, 556];
const ALLPASS_GAIN: f32 = 0.5;
const DAMPING: f32 = 0.4;

#[derive(Debug)]
struct Comb {
    buffer: Box<[f32]>,
    pos: usize,
    filtered: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)].into_boxed_slice(),
            pos: 0,
            filtered: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        self.filtered = delayed * (1.0 - DAMPING) + self.filtered * DAMPING;
        self.buffer[self.pos] = input + self.filtered * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        delayed
    }
}

#[derive(Debug)]
struct Allpass {
    buffer: Box<[f32]>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)].into_boxed_slice(),
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        self.buffer[self.pos] = input + ALLPASS_GAIN * delayed;
        self.pos = (self.pos + 1) % self.buffer.len();
        delayed - ALLPASS_GAIN * input
    }
}

/// Mono-in, mono-out algorithmic reverb.
#[derive(Debug)]
pub struct Reverb {
    combs: [Comb; 4],
    allpasses: [Allpass; 2],
    decay: f32,
}

impl Reverb {
    /// `decay` is the comb feedback, clamped below 1.
    pub fn new(decay: f32, sample_rate: f32) -> Self {
        let scale = |base: usize| (base as f32 * sample_rate / 48_000.0) as usize;
        Self {
            combs: COMB_DELAYS.map(|d| Comb::new(scale(d))),
            allpasses: ALLPASS_DELAYS.map(|d| Allpass::new(scale(d))),
            decay: decay.clamp(0.0, 0.98),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let decay = self.decay;
        let wet = self
            .combs
            .iter_mut()
            .fold(0.0, |acc, comb| acc + comb.process(input, decay))
            * 0.25;
        self.allpasses
            .iter_mut()
            .fold(wet, |acc, allpass| allpass.process(acc))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════

/// Stereo-linked peak limiter driven by an envelope follower.
#[derive(Debug)]
pub struct Limiter {
    threshold: f32,
    attack: f32,
    release: f32,
    env: f32,
}

impl Limiter {
    /// `attack` and `release` in milliseconds.
    pub fn new(threshold: f32, attack: f32, release: f32, sample_rate: f32) -> Self {
        let coeff = |ms: f32| 0.01_f32.powf(1.0 / (ms * sample_rate * 0.001).max(1.0));
        Self {
            threshold,
            attack: coeff(attack),
            release: coeff(release),
            env: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let peak = left.abs().max(right.abs());
        let coeff = if peak > self.env {
            self.attack
        } else {
            self.release
        };
        self.env = coeff * (self.env - peak) + peak;

        if self.env > self.threshold {
            let gain = self.threshold / self.env;
            (left * gain, right * gain)
        } else {
            (left, right)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Master bus
// ═══════════════════════════════════════════════════════════════════

/// Lows below this stay out of the reverb.
const REVERB_HIGHPASS_HZ: f32 = 200.0;

/// Reverb and delay sends plus an optional limiter after the voice mix.
///
/// With both sends at zero and no limiter the bus passes audio through
/// untouched.
#[derive(Debug)]
pub struct MasterBus {
    reverb_input: SvfFilter,
    reverb: Reverb,
    delay: Delay,
    limiter: Option<Limiter>,
    reverb_send: f32,
    delay_send: f32,
}

impl MasterBus {
    pub fn new(config: &EffectsConfig, sample_rate: f32) -> Self {
        let mut reverb_input = SvfFilter::highpass();
        reverb_input.set(REVERB_HIGHPASS_HZ, 0.0, sample_rate);
        Self {
            reverb_input,
            reverb: Reverb::new(config.reverb_decay, sample_rate),
            delay: Delay::new(config.delay_time, config.delay_feedback, sample_rate),
            limiter: config
                .limiter
                .then(|| Limiter::new(config.limiter_threshold, 0.1, 50.0, sample_rate)),
            reverb_send: config.reverb_send.clamp(0.0, 1.0),
            delay_send: config.delay_send.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mono = (left + right) * 0.5;
        let mut wet = 0.0;
        if self.reverb_send > 0.0 {
            let send = self.reverb_input.process(mono * self.reverb_send);
            wet += self.reverb.process(send);
        }
        if self.delay_send > 0.0 {
            wet += self.delay.process(mono * self.delay_send);
        }

        let (left, right) = (left + wet, right + wet);
        match self.limiter.as_mut() {
            Some(limiter) => limiter.process(left, right),
            None => (left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_delay_echoes_after_time() {
        let mut delay = Delay::new(0.01, 0.0, SR);
        assert_eq!(delay.process(1.0), 0.0);
        let echo: Vec<f32> = (0..480).map(|_| delay.process(0.0)).collect();
        assert_eq!(echo[479], 1.0);
        assert!(echo[..479].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_delay_feedback_repeats_and_decays() {
        let mut delay = Delay::new(0.001, 0.5, SR);
        delay.process(1.0);
        let out: Vec<f32> = (0..200).map(|_| delay.process(0.0)).collect();
        let peaks: Vec<f32> = out.into_iter().filter(|x| *x > 0.0).collect();
        assert_eq!(&peaks[..3], &[1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_reverb_tail_rings_and_stays_bounded() {
        let mut reverb = Reverb::new(0.8, SR);
        let mut energy = 0.0;
        let mut peak: f32 = 0.0;
        for i in 0..SR as usize {
            let y = reverb.process(if i == 0 { 1.0 } else { 0.0 });
            energy += y * y;
            peak = peak.max(y.abs());
        }
        assert!(energy > 0.0);
        assert!(peak <= 1.0);
    }

    #[test]
    fn test_limiter_holds_peaks_near_threshold() {
        let mut limiter = Limiter::new(0.5, 0.1, 50.0, SR);
        let mut out = (0.0, 0.0);
        for _ in 0..4800 {
            out = limiter.process(2.0, -2.0);
        }
        assert!((out.0 - 0.5).abs() < 1e-3);
        assert!((out.1 + 0.5).abs() < 1e-3);
        assert_eq!(limiter.process(0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_dry_bus_is_transparent() {
        let mut bus = MasterBus::new(&EffectsConfig::default(), SR);
        for x in [0.0, 0.3, -0.7, 1.5] {
            assert_eq!(bus.process(x, -x), (x, -x));
        }
    }

    #[test]
    fn test_sends_add_wet_signal() {
        let config = EffectsConfig {
            delay_send: 1.0,
            delay_time: 0.01,
            ..EffectsConfig::default()
        };
        let mut bus = MasterBus::new(&config, SR);
        bus.process(1.0, 1.0);
        let tail: f32 = (0..1000).map(|_| bus.process(0.0, 0.0).0.abs()).sum();
        assert!(tail > 0.5);
    }
}
