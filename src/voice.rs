// src/voice.rs

use crate::config::STEAL_FADE_SAMPLES;
use crate::dsp::{
    Envelope, Noise, Phasor, Pluck, SawOsc, Smoother, SvfFilter, pan_gains, pitch_to_freq,
    scale_log, sine,
};
use crate::event::Note;
use crate::track::{Parameter, Sound, TrackParams, TrackTable};

pub type VoiceId = usize;

/// Time constant of the live-parameter smoothers.
const SMOOTHING_SECS: f32 = 0.005;

/// Decay time of the kick's pitch sweep.
const KICK_SWEEP_SECS: f32 = 0.03;

/// A note waiting to start on a voice, with everything it needs to run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteRequest {
    pub note: Note,
    pub sound: Sound,
    /// Absolute beat at which the note releases itself.
    pub release_at: Option<f64>,
    /// Released by the host before it started sounding.
    pub release_requested: bool,
}

impl NoteRequest {
    pub fn new(note: Note, sound: Sound, release_at: Option<f64>) -> Self {
        Self {
            note,
            sound,
            release_at,
            release_requested: false,
        }
    }
}

/// Lifecycle of a voice slot.
///
/// `Fading` is the short forced fade used for stealing (`next` is the note
/// that takes over) and for cutting (`next` is `None`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceState {
    Idle,
    Sounding,
    Releasing,
    Fading {
        remaining: u32,
        next: Option<NoteRequest>,
    },
}

/// One slot of the voice pool.
///
/// Voices own all of their DSP state; nothing is allocated after
/// construction.
#[derive(Debug)]
pub struct Voice {
    pub id: VoiceId,
    state: VoiceState,

    note: Note,
    sound: Sound,
    onset: u64,
    release_at: Option<f64>,

    sample_rate: f32,
    freq: f32,
    gain: f32,

    // DSP state
    env: Envelope,
    carrier: Phasor,
    modulator: Phasor,
    saw: SawOsc,
    filter: SvfFilter,
    pluck: Pluck,
    kick_sweep: f32,
    kick_sweep_coeff: f32,
    noise: Noise,

    // Live parameters
    level: Smoother,
    pan: Smoother,
    tone: Smoother,
    modulation: Smoother,

    // Envelope times last applied, to skip recomputing coefficients
    attack_param: f32,
    release_param: f32,

    last_output: f32,

    /// Went idle on its own while still held (one-shot sounds).
    ended: bool,
}

impl Voice {
    pub fn new(id: VoiceId, sample_rate: f32) -> Self {
        Self {
            id,
            state: VoiceState::Idle,
            note: Note {
                pitch: 0,
                velocity: 0,
                track: 0,
                param1: 0.0,
                param2: 0.0,
            },
            sound: Sound::default(),
            onset: 0,
            release_at: None,
            sample_rate,
            freq: 0.0,
            gain: 0.0,
            env: Envelope::new(sample_rate),
            carrier: Phasor::new(),
            modulator: Phasor::new(),
            saw: SawOsc::new(),
            filter: SvfFilter::lowpass(),
            pluck: Pluck::new(),
            kick_sweep: 0.0,
            kick_sweep_coeff: (-1.0 / (KICK_SWEEP_SECS * sample_rate)).exp(),
            noise: Noise::new(id as u32 + 1),
            level: Smoother::new(SMOOTHING_SECS, sample_rate),
            pan: Smoother::new(SMOOTHING_SECS, sample_rate),
            tone: Smoother::new(SMOOTHING_SECS, sample_rate),
            modulation: Smoother::new(SMOOTHING_SECS, sample_rate),
            attack_param: -1.0,
            release_param: -1.0,
            last_output: 0.0,
            ended: false,
        }
    }

    // -------------------------------
    // MARK: State changes
    // -------------------------------

    /// Start `request` immediately, snapshotting the track's parameters.
    pub fn start(&mut self, request: NoteRequest, onset: u64, tracks: &TrackTable) {
        self.onset = onset;
        self.begin(request, &tracks.params(track_index(&request.note)));
    }

    /// Fade out whatever is playing, then start `request`.
    pub fn steal(&mut self, request: NoteRequest, onset: u64) {
        self.onset = onset;
        let remaining = match self.state {
            VoiceState::Fading { remaining, .. } => remaining,
            _ => STEAL_FADE_SAMPLES,
        };
        self.state = VoiceState::Fading {
            remaining,
            next: Some(request),
        };
    }

    /// Enter the release stage. Only a sounding voice is affected.
    pub fn release(&mut self) -> bool {
        if self.state != VoiceState::Sounding {
            return false;
        }
        self.env.release();
        self.state = VoiceState::Releasing;
        true
    }

    /// Mark a note waiting behind a steal fade to release as soon as it starts.
    pub fn release_pending(&mut self) -> bool {
        match &mut self.state {
            VoiceState::Fading {
                next: Some(request),
                ..
            } if !request.release_requested => {
                request.release_requested = true;
                true
            }
            _ => false,
        }
    }

    /// Fade to silence and go idle, dropping any pending note.
    pub fn cut(&mut self) {
        self.state = match self.state {
            VoiceState::Idle => VoiceState::Idle,
            VoiceState::Fading { remaining, .. } => VoiceState::Fading {
                remaining,
                next: None,
            },
            VoiceState::Sounding | VoiceState::Releasing => VoiceState::Fading {
                remaining: STEAL_FADE_SAMPLES,
                next: None,
            },
        };
    }

    /// Move the scheduled release, and that of a pending note, by `delta` beats.
    pub fn shift_release(&mut self, delta: f64) {
        if let Some(at) = self.release_at.as_mut() {
            *at += delta;
        }
        if let VoiceState::Fading {
            next: Some(request),
            ..
        } = &mut self.state
        {
            if let Some(at) = request.release_at.as_mut() {
                *at += delta;
            }
        }
    }

    fn begin(&mut self, request: NoteRequest, params: &TrackParams) {
        self.note = request.note;
        self.sound = request.sound;
        self.release_at = request.release_at;
        self.freq = pitch_to_freq(request.note.pitch.max(0) as u8);
        self.gain = request.note.velocity.max(0) as f32 / 127.0;

        self.level.reset(params.get(Parameter::Level));
        self.pan.reset(params.get(Parameter::Pan));
        self.tone.reset(self.tone_target(params));
        self.modulation.reset(self.modulation_target(params));
        self.update_envelope_times(params);

        self.carrier.reset();
        self.modulator.reset();
        self.saw.reset();
        self.filter.reset();
        self.kick_sweep = 1.0;
        if self.sound == Sound::Pluck {
            let tone = self.tone.value();
            self.pluck
                .excite(self.freq, self.sample_rate, tone, &mut self.noise);
        }

        self.env.trigger(self.sound.is_one_shot());
        self.state = VoiceState::Sounding;
        if request.release_requested {
            self.release();
        }
    }

    fn finish(&mut self) {
        self.state = VoiceState::Idle;
        self.release_at = None;
        self.env.reset();
        self.pluck.reset();
        self.last_output = 0.0;
    }

    // -------------------------------
    // MARK: Processing
    // -------------------------------

    /// Advance one sample and return the panned stereo contribution.
    ///
    /// Parameters are read live from the voice's track.
    #[inline]
    pub fn process(&mut self, tracks: &TrackTable) -> (f32, f32) {
        let fade = match self.state {
            VoiceState::Idle => return (0.0, 0.0),
            VoiceState::Sounding | VoiceState::Releasing => 1.0,
            VoiceState::Fading { remaining, .. } => remaining as f32 / STEAL_FADE_SAMPLES as f32,
        };
        let params = tracks.params(track_index(&self.note));

        let mono = self.render_sample(&params) * fade;
        self.last_output = mono.abs();
        let (gain_l, gain_r) = pan_gains(self.pan.value());

        match self.state {
            VoiceState::Fading { remaining, next } => {
                if remaining <= 1 {
                    match next {
                        Some(request) => {
                            self.begin(request, &tracks.params(track_index(&request.note)))
                        }
                        None => self.finish(),
                    }
                } else {
                    self.state = VoiceState::Fading {
                        remaining: remaining - 1,
                        next,
                    };
                }
            }
            state => {
                if self.env.is_idle() {
                    self.ended = state == VoiceState::Sounding;
                    self.finish();
                }
            }
        }

        (mono * gain_l, mono * gain_r)
    }

    fn render_sample(&mut self, params: &TrackParams) -> f32 {
        self.update_envelope_times(params);

        let level = self.level.process(params.get(Parameter::Level));
        self.pan.process(params.get(Parameter::Pan));
        let tone = self.tone.process(self.tone_target(params));
        let modulation = self.modulation.process(self.modulation_target(params));
        let resonance = params.get(Parameter::Resonance);

        let sr = self.sample_rate;
        let cutoff = scale_log(tone, 40.0, 16_000.0);

        let raw = match self.sound {
            Sound::Fm => {
                let ratio = 0.5 + params.get(Parameter::ModRatio) * 7.5;
                let index = modulation * 8.0;
                let m = sine(self.modulator.tick(self.freq * ratio / sr));
                let c = self.carrier.tick(self.freq / sr);
                let y = sine(c + index * m / std::f32::consts::TAU);
                self.filter.set(cutoff, resonance, sr);
                self.filter.process(y)
            }
            Sound::Subtractive => {
                let y = self.saw.process(self.freq / sr);
                self.filter.set(cutoff, resonance, sr);
                self.filter.process(y)
            }
            Sound::Pluck => {
                let decay = 0.990 + 0.0095 * params.get(Parameter::Release);
                self.pluck.process(tone, decay)
            }
            Sound::Kick => {
                let freq = self.freq * (1.0 + modulation * 8.0 * self.kick_sweep);
                self.kick_sweep *= self.kick_sweep_coeff;
                let click = self.noise.next_sample() * self.kick_sweep * (1.0 - tone) * 0.2;
                sine(self.carrier.tick(freq / sr)) + click
            }
        };

        raw * self.env.process() * self.gain * level
    }

    fn update_envelope_times(&mut self, params: &TrackParams) {
        let attack = params.get(Parameter::Attack);
        let release = params.get(Parameter::Release);
        if attack != self.attack_param || release != self.release_param {
            self.attack_param = attack;
            self.release_param = release;
            self.env.set_times(
                scale_log(attack, 0.001, 2.0),
                scale_log(release, 0.005, 4.0),
            );
        }
    }

    fn tone_target(&self, params: &TrackParams) -> f32 {
        (params.get(Parameter::Tone) + self.note.param1).clamp(0.0, 1.0)
    }

    fn modulation_target(&self, params: &TrackParams) -> f32 {
        (params.get(Parameter::ModAmount) + self.note.param2).clamp(0.0, 1.0)
    }

    /// Whether the voice just ended on its own without being released.
    /// Clears the flag.
    #[inline]
    pub fn take_ended(&mut self) -> bool {
        std::mem::take(&mut self.ended)
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == VoiceState::Idle
    }

    /// The note currently owning the slot (meaningless while idle).
    #[inline]
    pub fn note(&self) -> &Note {
        &self.note
    }

    #[inline]
    pub fn sound(&self) -> Sound {
        self.sound
    }

    #[inline]
    pub fn onset(&self) -> u64 {
        self.onset
    }

    #[inline]
    pub fn release_at(&self) -> Option<f64> {
        self.release_at
    }

    /// Magnitude of the most recent output sample.
    #[inline]
    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    /// Whether the slot's note is held, i.e. a release would end it.
    #[inline]
    pub fn is_sounding(&self, pitch: i8, track: i8) -> bool {
        self.state == VoiceState::Sounding && self.note.pitch == pitch && self.note.track == track
    }
}

#[inline]
fn track_index(note: &Note) -> usize {
    note.track.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn request(pitch: i8, sound: Sound) -> NoteRequest {
        let note = Note {
            pitch,
            velocity: 100,
            track: 0,
            param1: 0.0,
            param2: 0.0,
        };
        NoteRequest::new(note, sound, None)
    }

    fn run(voice: &mut Voice, tracks: &TrackTable, frames: usize) -> f32 {
        let mut peak: f32 = 0.0;
        for _ in 0..frames {
            let (l, r) = voice.process(tracks);
            peak = peak.max(l.abs()).max(r.abs());
        }
        peak
    }

    #[test]
    fn test_every_sound_is_audible() {
        let tracks = TrackTable::new(1);
        for sound in [Sound::Fm, Sound::Subtractive, Sound::Pluck, Sound::Kick] {
            let mut voice = Voice::new(0, SR);
            voice.start(request(45, sound), 0, &tracks);
            let peak = run(&mut voice, &tracks, 2400);
            assert!(peak > 1e-3, "{:?} peak {}", sound, peak);
        }
    }

    #[test]
    fn test_release_goes_idle() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(60, Sound::Fm), 0, &tracks);
        run(&mut voice, &tracks, 100);
        assert_eq!(voice.state(), VoiceState::Sounding);

        assert!(voice.release());
        assert_eq!(voice.state(), VoiceState::Releasing);
        assert!(!voice.release());

        run(&mut voice, &tracks, SR as usize * 5);
        assert!(voice.is_idle());
    }

    #[test]
    fn test_kick_ends_without_release() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(36, Sound::Kick), 0, &tracks);
        run(&mut voice, &tracks, SR as usize * 5);
        assert!(voice.is_idle());
    }

    #[test]
    fn test_kick_reports_its_own_end_once() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(36, Sound::Kick), 0, &tracks);

        let mut ends = 0;
        for _ in 0..SR as usize * 5 {
            voice.process(&tracks);
            if voice.take_ended() {
                ends += 1;
            }
        }
        assert_eq!(ends, 1);
        assert!(voice.is_idle());
    }

    #[test]
    fn test_released_voice_does_not_report_end() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(36, Sound::Kick), 0, &tracks);
        voice.process(&tracks);
        assert!(voice.release());
        for _ in 0..SR as usize * 5 {
            voice.process(&tracks);
            assert!(!voice.take_ended());
        }
        assert!(voice.is_idle());
    }

    #[test]
    fn test_shift_release_moves_current_and_pending() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        let mut held = request(60, Sound::Fm);
        held.release_at = Some(10.0);
        voice.start(held, 0, &tracks);
        voice.shift_release(-9.5);
        assert_eq!(voice.release_at(), Some(0.5));

        let mut next = request(64, Sound::Fm);
        next.release_at = Some(4.0);
        voice.steal(next, 1);
        voice.shift_release(1.0);
        run(&mut voice, &tracks, STEAL_FADE_SAMPLES as usize);
        assert_eq!(voice.release_at(), Some(5.0));
    }

    #[test]
    fn test_steal_fades_then_starts_next() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(60, Sound::Fm), 0, &tracks);
        run(&mut voice, &tracks, 1000);

        voice.steal(request(72, Sound::Subtractive), 5);
        assert!(matches!(voice.state(), VoiceState::Fading { .. }));
        assert_eq!(voice.onset(), 5);

        run(&mut voice, &tracks, STEAL_FADE_SAMPLES as usize);
        assert_eq!(voice.state(), VoiceState::Sounding);
        assert_eq!(voice.note().pitch, 72);
        assert_eq!(voice.sound(), Sound::Subtractive);
    }

    #[test]
    fn test_steal_fade_has_no_jump() {
        let tracks = TrackTable::new(1);
        tracks.set_parameter(0, Parameter::ModAmount as i8, 0.0);
        let mut voice = Voice::new(0, SR);
        voice.start(request(40, Sound::Fm), 0, &tracks);
        let mut prev = 0.0;
        for _ in 0..2000 {
            prev = voice.process(&tracks).0;
        }
        voice.steal(request(90, Sound::Fm), 1);
        let step_limit = 0.05;
        for _ in 0..STEAL_FADE_SAMPLES {
            let (l, _) = voice.process(&tracks);
            assert!((l - prev).abs() < step_limit, "jump {} -> {}", prev, l);
            prev = l;
        }
    }

    #[test]
    fn test_cut_goes_idle() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(60, Sound::Fm), 0, &tracks);
        voice.cut();
        run(&mut voice, &tracks, STEAL_FADE_SAMPLES as usize);
        assert!(voice.is_idle());
    }

    #[test]
    fn test_pending_release_applies_on_start() {
        let tracks = TrackTable::new(1);
        let mut voice = Voice::new(0, SR);
        voice.start(request(60, Sound::Fm), 0, &tracks);
        voice.steal(request(64, Sound::Fm), 1);
        assert!(voice.release_pending());
        assert!(!voice.release_pending());
        run(&mut voice, &tracks, STEAL_FADE_SAMPLES as usize);
        assert_eq!(voice.state(), VoiceState::Releasing);
    }

    #[test]
    fn test_level_parameter_scales_output() {
        let tracks = TrackTable::new(1);
        tracks.set_parameter(0, Parameter::Level as i8, 0.0);
        let mut voice = Voice::new(0, SR);
        voice.start(request(60, Sound::Fm), 0, &tracks);
        assert_eq!(run(&mut voice, &tracks, 1000), 0.0);
    }
}
