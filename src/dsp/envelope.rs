// Envelope generator.

/// Level below which a releasing envelope is considered silent (-80 dB).
pub const SILENCE_FLOOR: f32 = 1.0e-4;

// ═══════════════════════════════════════════════════════════════════
// Attack / Sustain / Release Envelope
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeStage {
    Idle,
    Attack,
    Sustain,
    Release,
}

/// Linear attack, full-level sustain, exponential release.
///
/// One-shot envelopes skip the sustain stage and release as soon as the
/// attack peaks.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
    one_shot: bool,

    attack_inc: f32,
    release_coeff: f32,

    sample_rate: f32,
}

impl Envelope {
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            one_shot: false,
            attack_inc: 1.0,
            release_coeff: 0.0,
            sample_rate,
        };
        env.set_times(0.001, 0.3);
        env
    }

    /// Update attack and release times (seconds). Safe mid-note.
    pub fn set_times(&mut self, attack: f32, release: f32) {
        self.attack_inc = 1.0 / (attack * self.sample_rate).max(1.0);
        let release_samples = (release * self.sample_rate).max(1.0);
        self.release_coeff = (SILENCE_FLOOR.ln() / release_samples).exp();
    }

    /// Start a note from silence.
    pub fn trigger(&mut self, one_shot: bool) {
        self.level = 0.0;
        self.one_shot = one_shot;
        self.stage = EnvelopeStage::Attack;
    }

    /// Enter the release stage from wherever the envelope is.
    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }

    #[inline]
    pub fn process(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {}

            EnvelopeStage::Attack => {
                self.level += self.attack_inc;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = if self.one_shot {
                        EnvelopeStage::Release
                    } else {
                        EnvelopeStage::Sustain
                    };
                }
            }

            EnvelopeStage::Sustain => {}

            EnvelopeStage::Release => {
                self.level *= self.release_coeff;
                if self.level <= SILENCE_FLOOR {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_attack_reaches_sustain() {
        let mut env = Envelope::new(SR);
        env.set_times(0.001, 0.1);
        env.trigger(false);
        assert_eq!(env.stage, EnvelopeStage::Attack);
        assert!(env.process() > 0.0);
        for _ in 0..100 {
            env.process();
        }
        assert_eq!(env.stage, EnvelopeStage::Sustain);
        assert_eq!(env.level, 1.0);
    }

    #[test]
    fn test_release_reaches_silence_in_time() {
        let mut env = Envelope::new(SR);
        env.set_times(0.0, 0.01);
        env.trigger(false);
        env.process();
        env.release();
        let budget = (0.01 * SR) as usize + 2;
        for _ in 0..budget {
            env.process();
        }
        assert!(env.is_idle());
        assert_eq!(env.level, 0.0);
    }

    #[test]
    fn test_one_shot_releases_without_gate() {
        let mut env = Envelope::new(SR);
        env.set_times(0.0, 0.005);
        env.trigger(true);
        for _ in 0..1000 {
            env.process();
        }
        assert!(env.is_idle());
    }

    #[test]
    fn test_release_from_idle_is_noop() {
        let mut env = Envelope::new(SR);
        env.release();
        assert!(env.is_idle());
        assert_eq!(env.process(), 0.0);
    }
}
