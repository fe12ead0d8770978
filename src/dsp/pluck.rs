// Karplus-Strong plucked string.

use crate::config::MAX_BUFFER_SIZE;

use super::Noise;

/// Plucked string: a delay line one period long, refilled through a
/// two-point averaging loop filter.
#[derive(Debug, Clone)]
pub struct Pluck {
    buffer: Box<[f32]>,
    period: usize,
    pos: usize,
    last: f32,
}

impl Pluck {
    /// Allocates the delay line; never called on the render path.
    pub fn new() -> Self {
        Self {
            buffer: vec![0.0; MAX_BUFFER_SIZE].into_boxed_slice(),
            period: 0,
            pos: 0,
            last: 0.0,
        }
    }

    /// Fill one period with the excitation signal.
    ///
    /// `tone` blends a triangle (1.0) with noise (0.0).
    pub fn excite(&mut self, freq: f32, sample_rate: f32, tone: f32, noise: &mut Noise) {
        let period = (sample_rate / freq.max(1.0)).round() as usize;
        self.period = period.clamp(2, self.buffer.len());
        self.pos = 0;
        self.last = 0.0;

        let tone = tone.clamp(0.0, 1.0);
        let len = self.period as f32;
        for (i, slot) in self.buffer[..self.period].iter_mut().enumerate() {
            let tri = triangle(i as f32 / len);
            *slot = tri * tone + noise.next_sample() * (1.0 - tone);
        }
    }

    /// Next sample. `brightness` 0..=1 sets how much of the averaging filter
    /// is bypassed; `decay` is the per-period loop gain.
    #[inline]
    pub fn process(&mut self, brightness: f32, decay: f32) -> f32 {
        if self.period == 0 {
            return 0.0;
        }
        let out = self.buffer[self.pos];
        let averaged = 0.5 * (out + self.last);
        let b = brightness.clamp(0.0, 1.0);
        self.buffer[self.pos] = decay * (b * out + (1.0 - b) * averaged);
        self.last = out;
        self.pos += 1;
        if self.pos >= self.period {
            self.pos = 0;
        }
        out
    }

    pub fn reset(&mut self) {
        self.buffer[..self.period].fill(0.0);
        self.period = 0;
        self.pos = 0;
        self.last = 0.0;
    }
}

impl Default for Pluck {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn triangle(phase: f32) -> f32 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_matches_pitch() {
        let mut pluck = Pluck::new();
        let mut noise = Noise::new(1);
        pluck.excite(440.0, 48_000.0, 0.5, &mut noise);
        assert_eq!(pluck.period, 109);
    }

    #[test]
    fn test_period_is_clamped_to_buffer() {
        let mut pluck = Pluck::new();
        let mut noise = Noise::new(1);
        pluck.excite(1.0, 192_000.0, 0.5, &mut noise);
        assert_eq!(pluck.period, MAX_BUFFER_SIZE);
    }

    #[test]
    fn test_string_decays() {
        let mut pluck = Pluck::new();
        let mut noise = Noise::new(3);
        pluck.excite(220.0, 48_000.0, 0.0, &mut noise);

        let energy = |p: &mut Pluck| (0..2000).map(|_| p.process(0.2, 0.996).powi(2)).sum::<f32>();
        let first = energy(&mut pluck);
        for _ in 0..48_000 {
            pluck.process(0.2, 0.996);
        }
        let later = energy(&mut pluck);
        assert!(later < first * 0.5, "first {} later {}", first, later);
    }

    #[test]
    fn test_silent_before_excite() {
        let mut pluck = Pluck::new();
        assert_eq!(pluck.process(0.5, 0.99), 0.0);
    }
}
