// src/config.rs
//
// Engine configuration and the versioned capability constants of the C header.

/// Reference pitch for frequency derivation.
pub const A4_FREQ: f32 = 440.0;
pub const A4_MIDI: u8 = 69;

/// Samples needed to hold one period of the lowest pluckable pitch.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Capacity of the beat-time event queue.
pub const EVENT_CAPACITY: usize = 1024;

/// Capacity of the control -> render command channel.
pub const COMMAND_CAPACITY: usize = 4096;

/// Length of the forced fade applied to stolen or cut voices.
pub const STEAL_FADE_SAMPLES: u32 = 64;

/// Upper bound on voice slots across the whole pool.
pub const MAX_VOICES: usize = 1024;

/// Highest accepted sample rate; bounds every per-sample buffer.
pub const MAX_SAMPLE_RATE: f32 = 384_000.0;

/// Longest master delay time in seconds.
pub const MAX_DELAY_SECS: f32 = 2.0;

pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
pub const DEFAULT_TRACKS: usize = 8;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 512;
pub const DEFAULT_MASTER_GAIN: f32 = 0.5;

/// How voices are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceLayout {
    /// One pool shared by every track.
    Shared { voices: usize },

    /// Each track owns its own slice of the pool.
    PerTrack { voices: usize },
}

/// First header revision: 8 voices shared by all tracks.
pub const VOICE_LAYOUT_V1: VoiceLayout = VoiceLayout::Shared { voices: 8 };

/// Current header revision (`VOICE_COUNT 1`): one voice per track.
pub const VOICE_LAYOUT_V2: VoiceLayout = VoiceLayout::PerTrack { voices: 1 };

impl VoiceLayout {
    /// Voices per allocation group.
    #[inline]
    pub fn voices(&self) -> usize {
        match *self {
            VoiceLayout::Shared { voices } | VoiceLayout::PerTrack { voices } => voices,
        }
    }

    /// Total number of voice slots for the given track count.
    pub fn total_voices(&self, tracks: usize) -> usize {
        match *self {
            VoiceLayout::Shared { voices } => voices,
            VoiceLayout::PerTrack { voices } => voices * tracks,
        }
    }
}

/// What happens to sounding voices when the transport pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PausePolicy {
    /// Held notes are released and ring out through their envelopes.
    #[default]
    Decay,

    /// Held notes keep sounding; scheduled releases wait for resume.
    Freeze,

    /// Every voice is faded out over `STEAL_FADE_SAMPLES`.
    Cut,
}

impl PausePolicy {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => PausePolicy::Freeze,
            2 => PausePolicy::Cut,
            _ => PausePolicy::Decay,
        }
    }
}

/// Master bus effects applied after the voice mix.
///
/// Sends are 0..=1; a zero send bypasses its effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsConfig {
    pub reverb_send: f32,
    /// Comb feedback of the reverb, 0..1.
    pub reverb_decay: f32,
    pub delay_send: f32,
    /// Delay time in seconds, up to `MAX_DELAY_SECS`.
    pub delay_time: f32,
    pub delay_feedback: f32,
    pub limiter: bool,
    /// Peak level the limiter holds the output to.
    pub limiter_threshold: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            reverb_send: 0.0,
            reverb_decay: 0.8,
            delay_send: 0.0,
            delay_time: 0.5,
            delay_feedback: 0.5,
            limiter: false,
            limiter_threshold: 0.9,
        }
    }
}

impl EffectsConfig {
    fn is_finite(&self) -> bool {
        [
            self.reverb_send,
            self.reverb_decay,
            self.delay_send,
            self.delay_time,
            self.delay_feedback,
            self.limiter_threshold,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Engine construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,

    /// Number of tracks in the parameter table.
    pub tracks: usize,

    /// Polyphony layout.
    pub layout: VoiceLayout,

    pub pause_policy: PausePolicy,

    /// Loop length in beats; 0 plays a linear timeline.
    pub loop_length: f64,

    /// Frames between progress notifications inside one render call.
    pub progress_interval: usize,

    /// Gain applied to the voice sum.
    pub master_gain: f32,

    pub effects: EffectsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            tracks: DEFAULT_TRACKS,
            layout: VOICE_LAYOUT_V2,
            pause_policy: PausePolicy::Decay,
            loop_length: 0.0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            master_gain: DEFAULT_MASTER_GAIN,
            effects: EffectsConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.sample_rate.is_finite()
            || self.sample_rate <= 0.0
            || self.sample_rate > MAX_SAMPLE_RATE
        {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.tracks == 0 || self.tracks > i8::MAX as usize {
            return Err(ConfigError::InvalidTrackCount(self.tracks));
        }
        if self.layout.voices() == 0 {
            return Err(ConfigError::NoVoices);
        }
        let total = self
            .layout
            .voices()
            .checked_mul(match self.layout {
                VoiceLayout::Shared { .. } => 1,
                VoiceLayout::PerTrack { .. } => self.tracks,
            })
            .unwrap_or(usize::MAX);
        if total > MAX_VOICES {
            return Err(ConfigError::TooManyVoices(total));
        }
        if !self.loop_length.is_finite() || self.loop_length < 0.0 {
            return Err(ConfigError::InvalidLoopLength(self.loop_length));
        }
        if !self.master_gain.is_finite() {
            return Err(ConfigError::InvalidMasterGain(self.master_gain));
        }
        if !self.effects.is_finite() {
            return Err(ConfigError::InvalidEffects);
        }
        Ok(())
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.loop_length > 0.0
    }
}

/// Error during engine construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidSampleRate(f32),
    InvalidTrackCount(usize),
    NoVoices,
    TooManyVoices(usize),
    InvalidLoopLength(f64),
    InvalidMasterGain(f32),
    InvalidEffects,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidSampleRate(rate) => {
                write!(f, "Invalid sample rate {}", rate)
            }
            ConfigError::InvalidTrackCount(count) => {
                write!(f, "Track count {} outside 1..=127", count)
            }
            ConfigError::NoVoices => write!(f, "Voice layout has no voices"),
            ConfigError::TooManyVoices(total) => {
                write!(f, "{} voices exceed the limit of {}", total, MAX_VOICES)
            }
            ConfigError::InvalidLoopLength(length) => {
                write!(f, "Invalid loop length {} beats", length)
            }
            ConfigError::InvalidMasterGain(gain) => {
                write!(f, "Invalid master gain {}", gain)
            }
            ConfigError::InvalidEffects => write!(f, "Non-finite effect setting"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;
