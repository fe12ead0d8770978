// src/voice_pool.rs

use crate::config::VoiceLayout;
use crate::event::Note;
use crate::track::TrackTable;
use crate::voice::{NoteRequest, Voice, VoiceId, VoiceState};

/// Outcome of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Allocation {
    /// An idle slot was taken.
    Fresh(VoiceId),
    /// A busy slot was stolen. `previous` is the held note it cut short,
    /// if any, so the caller can report its note-off.
    Stolen {
        voice: VoiceId,
        previous: Option<Note>,
    },
}

/// Fixed arena of voices.
///
/// Responsibilities:
/// - map notes to voices, per the configured layout
/// - steal when the eligible range is full
/// - release held notes by (pitch, track)
///
/// Does NOT:
/// - allocate after construction
/// - decide when notes fire
pub struct VoicePool {
    voices: Box<[Voice]>,
    layout: VoiceLayout,
    steals: u64,
}

impl VoicePool {
    pub fn new(layout: VoiceLayout, tracks: usize, sample_rate: f32) -> Self {
        let voices = (0..layout.total_voices(tracks))
            .map(|id| Voice::new(id, sample_rate))
            .collect();
        Self {
            voices,
            layout,
            steals: 0,
        }
    }

    /// Slots a note on `track` may occupy.
    fn eligible(&self, track: i8) -> std::ops::Range<usize> {
        let len = self.voices.len();
        match self.layout {
            VoiceLayout::Shared { .. } => 0..len,
            VoiceLayout::PerTrack { voices } => {
                let start = (track.max(0) as usize * voices).min(len);
                start..(start + voices).min(len)
            }
        }
    }

    /// Allocate a voice for `request`.
    ///
    /// Takes the first idle slot in range; otherwise steals the oldest
    /// onset, breaking ties by the quietest current output. Returns `None`
    /// only when the track has no slots.
    pub fn allocate(
        &mut self,
        request: NoteRequest,
        onset: u64,
        tracks: &TrackTable,
    ) -> Option<Allocation> {
        let range = self.eligible(request.note.track);
        if range.is_empty() {
            return None;
        }

        if let Some(voice) = self.voices[range.clone()].iter_mut().find(|v| v.is_idle()) {
            voice.start(request, onset, tracks);
            return Some(Allocation::Fresh(voice.id));
        }

        let victim = self.voices[range]
            .iter_mut()
            .min_by(|a, b| {
                a.onset()
                    .cmp(&b.onset())
                    .then(a.last_output().total_cmp(&b.last_output()))
            })?;

        let previous = match victim.state() {
            VoiceState::Sounding => Some(*victim.note()),
            VoiceState::Fading {
                next: Some(pending),
                ..
            } if !pending.release_requested => Some(pending.note),
            _ => None,
        };

        victim.steal(request, onset);
        self.steals += 1;
        Some(Allocation::Stolen {
            voice: victim.id,
            previous,
        })
    }

    /// Release the oldest held voice playing (pitch, track).
    ///
    /// Falls back to a matching note still waiting behind a steal fade.
    /// Returns whether anything was released.
    pub fn release(&mut self, pitch: i8, track: i8) -> bool {
        let range = self.eligible(track);
        let voices = &mut self.voices[range];

        if let Some(voice) = voices
            .iter_mut()
            .filter(|v| v.is_sounding(pitch, track))
            .min_by_key(|v| v.onset())
        {
            return voice.release();
        }

        voices
            .iter_mut()
            .filter(|v| {
                matches!(
                    v.state(),
                    VoiceState::Fading { next: Some(pending), .. }
                        if pending.note.pitch == pitch && pending.note.track == track
                )
            })
            .min_by_key(|v| v.onset())
            .is_some_and(|v| v.release_pending())
    }

    /// Release every held voice whose scheduled release beat has passed.
    pub fn release_due(&mut self, beat: f64, mut on_release: impl FnMut(&Note)) {
        for voice in self.voices.iter_mut() {
            if voice.state() != VoiceState::Sounding {
                continue;
            }
            if voice.release_at().is_some_and(|at| at <= beat) && voice.release() {
                on_release(voice.note());
            }
        }
    }

    /// Release every held voice and every pending stolen note.
    pub fn release_all(&mut self, mut on_release: impl FnMut(&Note)) {
        for voice in self.voices.iter_mut() {
            if voice.release() {
                on_release(voice.note());
            } else if let VoiceState::Fading {
                next: Some(pending),
                ..
            } = voice.state()
            {
                if voice.release_pending() {
                    on_release(&pending.note);
                }
            }
        }
    }

    /// Fade every voice out and leave it idle.
    pub fn fade_all(&mut self, mut on_release: impl FnMut(&Note)) {
        for voice in self.voices.iter_mut() {
            match voice.state() {
                VoiceState::Sounding => on_release(voice.note()),
                VoiceState::Fading {
                    next: Some(pending),
                    ..
                } if !pending.release_requested => on_release(&pending.note),
                _ => {}
            }
            voice.cut();
        }
    }

    /// Move every scheduled release by `delta` beats (timeline jumps).
    pub fn shift_releases(&mut self, delta: f64) {
        for voice in self.voices.iter_mut() {
            voice.shift_release(delta);
        }
    }

    /// Mix one frame of every voice, returning the stereo sum.
    ///
    /// `on_end` sees every held note that finished on its own this frame.
    #[inline]
    pub fn process(&mut self, tracks: &TrackTable, mut on_end: impl FnMut(&Note)) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        for voice in self.voices.iter_mut() {
            let (l, r) = voice.process(tracks);
            if voice.take_ended() {
                on_end(voice.note());
            }
            left += l;
            right += r;
        }
        (left, right)
    }

    /// Number of non-idle voices.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    /// Total steals since construction.
    pub fn steal_count(&self) -> u64 {
        self.steals
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{STEAL_FADE_SAMPLES, VOICE_LAYOUT_V1, VOICE_LAYOUT_V2};
    use crate::track::Sound;

    const SR: f32 = 48_000.0;

    fn request(pitch: i8, track: i8) -> NoteRequest {
        let note = Note {
            pitch,
            velocity: 100,
            track,
            param1: 0.0,
            param2: 0.0,
        };
        NoteRequest::new(note, Sound::Fm, None)
    }

    #[test]
    fn test_fresh_allocation() {
        let tracks = TrackTable::new(4);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 4, SR);
        assert_eq!(pool.voices.len(), 8);
        assert_eq!(
            pool.allocate(request(60, 0), 0, &tracks),
            Some(Allocation::Fresh(0))
        );
        assert_eq!(
            pool.allocate(request(62, 1), 0, &tracks),
            Some(Allocation::Fresh(1))
        );
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.steal_count(), 0);
    }

    #[test]
    fn test_steals_oldest() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 1, SR);
        for i in 0..8 {
            pool.allocate(request(60 + i, 0), i as u64, &tracks);
        }
        let alloc = pool.allocate(request(80, 0), 100, &tracks);
        assert_eq!(
            alloc,
            Some(Allocation::Stolen {
                voice: 0,
                previous: Some(request(60, 0).note),
            })
        );
        assert_eq!(pool.steal_count(), 1);
        assert_eq!(pool.active_count(), 8);
    }

    #[test]
    fn test_steal_tie_prefers_quietest() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VoiceLayout::Shared { voices: 2 }, 1, SR);
        pool.allocate(request(60, 0), 0, &tracks);
        pool.allocate(request(64, 0), 0, &tracks);
        for _ in 0..200 {
            pool.process(&tracks, |_| {});
        }
        let quieter = if pool.voices[0].last_output() <= pool.voices[1].last_output() {
            0
        } else {
            1
        };
        let alloc = pool.allocate(request(67, 0), 1, &tracks);
        assert!(matches!(alloc, Some(Allocation::Stolen { voice, .. }) if voice == quieter));
    }

    #[test]
    fn test_per_track_layout_isolates_tracks() {
        let tracks = TrackTable::new(2);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V2, 2, SR);
        assert_eq!(pool.voices.len(), 2);
        assert_eq!(
            pool.allocate(request(60, 0), 0, &tracks),
            Some(Allocation::Fresh(0))
        );
        assert_eq!(
            pool.allocate(request(60, 1), 0, &tracks),
            Some(Allocation::Fresh(1))
        );
        let alloc = pool.allocate(request(62, 0), 1, &tracks);
        assert!(matches!(alloc, Some(Allocation::Stolen { voice: 0, .. })));
        assert_eq!(pool.get(1).map(|v| v.note().pitch), Some(60));
    }

    #[test]
    fn test_no_slots_for_unknown_track() {
        let tracks = TrackTable::new(2);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V2, 2, SR);
        assert_eq!(pool.allocate(request(60, 5), 0, &tracks), None);
    }

    #[test]
    fn test_release_matches_pitch_and_track() {
        let tracks = TrackTable::new(2);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 2, SR);
        pool.allocate(request(60, 0), 0, &tracks);
        pool.allocate(request(60, 1), 1, &tracks);

        assert!(!pool.release(61, 0));
        assert!(pool.release(60, 1));
        assert_eq!(pool.get(1).map(|v| v.state()), Some(VoiceState::Releasing));
        assert_eq!(pool.get(0).map(|v| v.state()), Some(VoiceState::Sounding));
    }

    #[test]
    fn test_release_reaches_pending_note() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VoiceLayout::Shared { voices: 1 }, 1, SR);
        pool.allocate(request(60, 0), 0, &tracks);
        pool.allocate(request(72, 0), 1, &tracks);
        assert!(pool.release(72, 0));
        for _ in 0..STEAL_FADE_SAMPLES {
            pool.process(&tracks, |_| {});
        }
        assert_eq!(pool.get(0).map(|v| v.state()), Some(VoiceState::Releasing));
    }

    #[test]
    fn test_release_due() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 1, SR);
        let mut early = request(60, 0);
        early.release_at = Some(1.0);
        let mut late = request(62, 0);
        late.release_at = Some(2.0);
        pool.allocate(early, 0, &tracks);
        pool.allocate(late, 0, &tracks);

        let mut released = Vec::new();
        pool.release_due(1.0, |note| released.push(note.pitch));
        assert_eq!(released, vec![60]);
        pool.release_due(1.5, |note| released.push(note.pitch));
        assert_eq!(released, vec![60]);
    }

    #[test]
    fn test_shift_releases_moves_schedule() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 1, SR);
        let mut held = request(60, 0);
        held.release_at = Some(11.0);
        pool.allocate(held, 0, &tracks);

        pool.shift_releases(-10.5);
        let mut released = Vec::new();
        pool.release_due(0.5, |note| released.push(note.pitch));
        assert_eq!(released, vec![60]);
    }

    #[test]
    fn test_process_reports_one_shot_end() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 1, SR);
        let mut kick = request(36, 0);
        kick.sound = Sound::Kick;
        pool.allocate(kick, 0, &tracks);

        let mut ended = Vec::new();
        for _ in 0..SR as usize * 5 {
            pool.process(&tracks, |note| ended.push(note.pitch));
        }
        assert_eq!(ended, vec![36]);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_fade_all_silences_pool() {
        let tracks = TrackTable::new(1);
        let mut pool = VoicePool::new(VOICE_LAYOUT_V1, 1, SR);
        pool.allocate(request(60, 0), 0, &tracks);
        pool.allocate(request(64, 0), 0, &tracks);

        let mut cut = 0;
        pool.fade_all(|_| cut += 1);
        assert_eq!(cut, 2);
        for _ in 0..STEAL_FADE_SAMPLES {
            pool.process(&tracks, |_| {});
        }
        assert_eq!(pool.active_count(), 0);
    }
}
