// src/event.rs

/// ===============================
/// Scheduled musical events
/// ===============================

/// A note event expressed in musical time (beats).
///
/// These events:
/// - are immutable once enqueued
/// - fire in non-decreasing `beat_time` order, FIFO among equal times
/// - schedule their own release at `beat_time + duration`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub beat_time: f32,
    pub pitch: i8,
    pub velocity: i8,
    /// Length in beats.
    pub duration: f32,
    pub track: i8,
    pub param1: f32,
    pub param2: f32,
}

impl Event {
    pub fn new(beat_time: f32, pitch: i8, velocity: i8, duration: f32, track: i8) -> Self {
        Self {
            beat_time,
            pitch,
            velocity,
            duration,
            track,
            param1: 0.0,
            param2: 0.0,
        }
    }

    pub fn with_params(mut self, param1: f32, param2: f32) -> Self {
        self.param1 = param1;
        self.param2 = param2;
        self
    }

    /// Whether the event can ever produce a note on a table of `tracks` tracks.
    pub fn is_playable(&self, tracks: usize) -> bool {
        self.beat_time.is_finite()
            && self.beat_time >= 0.0
            && is_valid_note(self.pitch, self.velocity, self.track, tracks)
    }

    /// The note request this event turns into when it fires.
    pub fn note(&self) -> Note {
        Note {
            pitch: self.pitch,
            velocity: self.velocity,
            track: self.track,
            param1: self.param1,
            param2: self.param2,
        }
    }

    /// Duration in beats, with non-finite or negative lengths treated as zero.
    #[inline]
    pub fn duration_beats(&self) -> f64 {
        if self.duration.is_finite() {
            self.duration.max(0.0) as f64
        } else {
            0.0
        }
    }
}

/// Pitch, velocity and per-note parameters of one note-on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub pitch: i8,
    pub velocity: i8,
    pub track: i8,
    pub param1: f32,
    pub param2: f32,
}

/// Pitch must be 0..=127 (i8 guarantees the upper bound), velocity positive
/// and the track inside the table.
#[inline]
pub fn is_valid_note(pitch: i8, velocity: i8, track: i8, tracks: usize) -> bool {
    pitch >= 0 && velocity > 0 && is_valid_track(track, tracks)
}

#[inline]
pub fn is_valid_track(track: i8, tracks: usize) -> bool {
    track >= 0 && (track as usize) < tracks
}

/// ===============================
/// Control -> render commands
/// ===============================

/// A request from the host thread to the render thread.
///
/// Commands are applied in FIFO order at the start of a render call,
/// so each one is atomic with respect to rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Insert an event into the beat-time queue.
    Schedule(Event),

    /// Drop every pending event.
    ClearEvents,

    /// Immediate note-on, bypassing the queue.
    NoteOn(Note),

    /// Immediate note-off, bypassing the queue.
    NoteOff { pitch: i8, track: i8 },

    /// Play or pause the transport.
    SetPlaying(bool),
}
