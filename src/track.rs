// src/track.rs
//
// Per-track sound selection and parameter values.
//
// The table is shared between the host thread (writes) and the render
// thread (reads every frame). Values live in atomics so neither side ever
// blocks; f32 values are stored as their bit patterns (no AtomicF32 in std).

use std::sync::atomic::{AtomicI8, AtomicU32, Ordering};

use crate::event::is_valid_track;

pub const PARAMETER_COUNT: usize = 8;
pub const SOUND_COUNT: usize = 4;

// ═══════════════════════════════════════════════════════════════════
// Parameters
// ═══════════════════════════════════════════════════════════════════

/// Legal parameter identifiers. Values are normalised to 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum Parameter {
    Attack = 0,
    Release = 1,
    Tone = 2,
    Resonance = 3,
    Level = 4,
    Pan = 5,
    ModAmount = 6,
    ModRatio = 7,
}

impl Parameter {
    pub const ALL: [Parameter; PARAMETER_COUNT] = [
        Parameter::Attack,
        Parameter::Release,
        Parameter::Tone,
        Parameter::Resonance,
        Parameter::Level,
        Parameter::Pan,
        Parameter::ModAmount,
        Parameter::ModRatio,
    ];

    pub fn from_id(id: i8) -> Option<Self> {
        if id < 0 {
            return None;
        }
        Self::ALL.get(id as usize).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn default_value(self) -> f32 {
        match self {
            Parameter::Attack => 0.0,
            Parameter::Release => 0.3,
            Parameter::Tone => 0.6,
            Parameter::Resonance => 0.2,
            Parameter::Level => 0.8,
            Parameter::Pan => 0.5,
            Parameter::ModAmount => 0.3,
            Parameter::ModRatio => 0.25,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Parameter::Attack => "Attack",
            Parameter::Release => "Release",
            Parameter::Tone => "Tone",
            Parameter::Resonance => "Resonance",
            Parameter::Level => "Level",
            Parameter::Pan => "Pan",
            Parameter::ModAmount => "Mod Amount",
            Parameter::ModRatio => "Mod Ratio",
        }
    }
}

/// Snapshot of one track's parameter values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParams {
    values: [f32; PARAMETER_COUNT],
}

impl TrackParams {
    #[inline]
    pub fn get(&self, parameter: Parameter) -> f32 {
        self.values[parameter.index()]
    }

    pub fn set(&mut self, parameter: Parameter, value: f32) {
        self.values[parameter.index()] = value.clamp(0.0, 1.0);
    }
}

impl Default for TrackParams {
    fn default() -> Self {
        let mut values = [0.0; PARAMETER_COUNT];
        for p in Parameter::ALL {
            values[p.index()] = p.default_value();
        }
        Self { values }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Sounds
// ═══════════════════════════════════════════════════════════════════

/// Synthesis algorithm a voice runs for its note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sound {
    /// Two-operator FM.
    #[default]
    Fm,
    /// Saw through a resonant low-pass.
    Subtractive,
    /// Karplus-Strong plucked string.
    Pluck,
    /// Pitch-swept sine drum.
    Kick,
}

impl Sound {
    pub fn from_id(id: i8) -> Option<Self> {
        match id {
            0 => Some(Sound::Fm),
            1 => Some(Sound::Subtractive),
            2 => Some(Sound::Pluck),
            3 => Some(Sound::Kick),
            _ => None,
        }
    }

    pub fn id(self) -> i8 {
        match self {
            Sound::Fm => 0,
            Sound::Subtractive => 1,
            Sound::Pluck => 2,
            Sound::Kick => 3,
        }
    }

    /// One-shot sounds decay on their own after the attack.
    pub fn is_one_shot(self) -> bool {
        matches!(self, Sound::Kick)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Track table
// ═══════════════════════════════════════════════════════════════════

struct TrackSlot {
    sound: AtomicI8,
    params: [AtomicU32; PARAMETER_COUNT],
}

impl TrackSlot {
    fn new(sound: Sound) -> Self {
        let defaults = TrackParams::default();
        Self {
            sound: AtomicI8::new(sound.id()),
            params: std::array::from_fn(|i| AtomicU32::new(defaults.values[i].to_bits())),
        }
    }
}

/// Lock-free table of per-track state.
pub struct TrackTable {
    tracks: Box<[TrackSlot]>,
}

impl TrackTable {
    /// Track `n` starts with sound `n % SOUND_COUNT`.
    pub fn new(count: usize) -> Self {
        let tracks = (0..count)
            .map(|i| {
                let sound = Sound::from_id((i % SOUND_COUNT) as i8).unwrap_or_default();
                TrackSlot::new(sound)
            })
            .collect();
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Select the sound for subsequent notes on `track`.
    ///
    /// Returns `false` (and changes nothing) for unknown sounds or tracks.
    pub fn set_sound(&self, track: i8, sound: i8) -> bool {
        if !is_valid_track(track, self.len()) || Sound::from_id(sound).is_none() {
            return false;
        }
        self.tracks[track as usize]
            .sound
            .store(sound, Ordering::Relaxed);
        true
    }

    /// Write one parameter value, clamped to 0..=1.
    ///
    /// Returns `false` (and changes nothing) for unknown parameters,
    /// tracks, or non-finite values.
    pub fn set_parameter(&self, track: i8, parameter: i8, value: f32) -> bool {
        let Some(parameter) = Parameter::from_id(parameter) else {
            return false;
        };
        if !is_valid_track(track, self.len()) || !value.is_finite() {
            return false;
        }
        self.tracks[track as usize].params[parameter.index()]
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        true
    }

    #[inline]
    pub fn sound(&self, track: usize) -> Sound {
        self.tracks
            .get(track)
            .and_then(|t| Sound::from_id(t.sound.load(Ordering::Relaxed)))
            .unwrap_or_default()
    }

    #[inline]
    pub fn get(&self, track: usize, parameter: Parameter) -> f32 {
        self.tracks
            .get(track)
            .map(|t| f32::from_bits(t.params[parameter.index()].load(Ordering::Relaxed)))
            .unwrap_or_else(|| parameter.default_value())
    }

    /// Current values of every parameter on `track`.
    #[inline]
    pub fn params(&self, track: usize) -> TrackParams {
        match self.tracks.get(track) {
            Some(t) => TrackParams {
                values: std::array::from_fn(|i| {
                    f32::from_bits(t.params[i].load(Ordering::Relaxed))
                }),
            },
            None => TrackParams::default(),
        }
    }
}
