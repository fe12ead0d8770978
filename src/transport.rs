// src/transport.rs

//
// ===============================
// MARK: Beat clock (RT-safe)
// ===============================
//

/// Maps absolute sample positions to musical beat-time.
///
/// The host's `sample_time` is the only source of truth for position. The
/// clock integrates from an anchor `(sample, beat)`:
///
/// `beat(s) = anchor_beat + (s - anchor_sample) * tempo / (60 * sample_rate)`
///
/// The anchor moves only when a render call is not contiguous with the
/// previous one (a seek) or when the tempo changes, so beat-time never jumps
/// under tempo automation and constant-tempo playback is independent of how
/// the host chunks its buffers.
#[derive(Debug, Clone)]
pub struct Clock {
    sample_rate: f64,

    /// Tempo in BPM currently integrated.
    tempo: f64,

    anchor_sample: i64,
    anchor_beat: f64,

    /// Sample position expected at the start of the next render call.
    next_sample: Option<i64>,
}

impl Clock {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            tempo: 120.0,
            anchor_sample: 0,
            anchor_beat: 0.0,
            next_sample: None,
        }
    }

    // -------------------------------
    // MARK: Render boundary
    // -------------------------------

    /// Align the clock to the start of a render call.
    ///
    /// Returns `true` when the call is not contiguous with the previous one.
    pub fn begin_block(&mut self, sample_time: i64, tempo: f32) -> bool {
        let tempo = if tempo.is_finite() && tempo > 0.0 {
            tempo as f64
        } else {
            self.tempo
        };

        let contiguous = self.next_sample == Some(sample_time);
        if !contiguous {
            self.tempo = tempo;
            self.anchor_sample = sample_time;
            self.anchor_beat = self.samples_to_beats(sample_time as f64);
        } else if tempo != self.tempo {
            self.anchor_beat = self.beat_at(sample_time);
            self.anchor_sample = sample_time;
            self.tempo = tempo;
        }

        !contiguous
    }

    /// Record where the next render call is expected to start.
    #[inline]
    pub fn end_block(&mut self, next_sample_time: i64) {
        self.next_sample = Some(next_sample_time);
    }

    // -------------------------------
    // MARK: Conversions
    // -------------------------------

    /// Beat position of an absolute sample index.
    #[inline]
    pub fn beat_at(&self, sample: i64) -> f64 {
        self.anchor_beat + self.samples_to_beats((sample - self.anchor_sample) as f64)
    }

    #[inline]
    pub fn samples_to_beats(&self, samples: f64) -> f64 {
        samples * self.tempo / (60.0 * self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_beat_at_constant_tempo() {
        let mut clock = Clock::new(SR);
        assert!(clock.begin_block(0, 120.0));
        assert_eq!(clock.beat_at(24_000), 1.0);
        assert_eq!(clock.beat_at(48_000), 2.0);
    }

    #[test]
    fn test_contiguous_calls_keep_anchor() {
        let mut clock = Clock::new(SR);
        clock.begin_block(0, 120.0);
        clock.end_block(512);
        assert!(!clock.begin_block(512, 120.0));
        assert_eq!(clock.beat_at(512), 512.0 / 24_000.0);
    }

    #[test]
    fn test_tempo_change_is_continuous() {
        let mut clock = Clock::new(SR);
        clock.begin_block(0, 120.0);
        clock.end_block(24_000);

        // One beat elapsed at 120 BPM; doubling the tempo must not jump.
        assert!(!clock.begin_block(24_000, 240.0));
        assert_eq!(clock.beat_at(24_000), 1.0);
        assert_eq!(clock.beat_at(36_000), 2.0);
    }

    #[test]
    fn test_discontinuity_reanchors_from_sample_time() {
        let mut clock = Clock::new(SR);
        clock.begin_block(0, 120.0);
        clock.end_block(512);

        assert!(clock.begin_block(96_000, 120.0));
        assert_eq!(clock.beat_at(96_000), 4.0);
    }

    #[test]
    fn test_invalid_tempo_keeps_previous() {
        let mut clock = Clock::new(SR);
        clock.begin_block(0, 90.0);
        clock.end_block(64);
        clock.begin_block(64, f32::NAN);
        assert_eq!(clock.tempo, 90.0);
        clock.end_block(128);
        clock.begin_block(128, -10.0);
        assert_eq!(clock.tempo, 90.0);
    }
}
