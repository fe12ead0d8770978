// Basic oscillators.

use std::f32::consts::TAU;

// ═══════════════════════════════════════════════════════════════════
// Phasor
// ═══════════════════════════════════════════════════════════════════

/// Normalised phase accumulator in 0..1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Phasor {
    phase: f32,
}

impl Phasor {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Return the current phase, then advance by `inc` cycles.
    #[inline]
    pub fn tick(&mut self, inc: f32) -> f32 {
        let phase = self.phase;
        self.phase = (self.phase + inc).fract();
        phase
    }
}

/// Sine of a normalised phase.
#[inline]
pub fn sine(phase: f32) -> f32 {
    (phase * TAU).sin()
}

// ═══════════════════════════════════════════════════════════════════
// Saw Oscillator (PolyBLEP)
// ═══════════════════════════════════════════════════════════════════

/// Sawtooth with a polynomial band-limited step at the wrap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SawOsc {
    phasor: Phasor,
}

impl SawOsc {
    pub fn new() -> Self {
        Self {
            phasor: Phasor::new(),
        }
    }

    pub fn reset(&mut self) {
        self.phasor.reset();
    }

    #[inline]
    pub fn process(&mut self, inc: f32) -> f32 {
        let inc = inc.clamp(0.0, 0.5);
        let t = self.phasor.tick(inc);
        2.0 * t - 1.0 - poly_blep(t, inc)
    }
}

#[inline]
fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let x = t / dt;
        x + x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + x + x + 1.0
    } else {
        0.0
    }
}
