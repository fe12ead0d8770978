// src/engine.rs

use std::sync::Arc;

use log::warn;

use crate::config::{ConfigResult, EngineConfig, PausePolicy};
use crate::dsp::MasterBus;
use crate::event::{Command, Event, Note, is_valid_note};
use crate::event_queue::EventQueue;
use crate::notify::Notifier;
use crate::track::TrackTable;
use crate::transport::Clock;
use crate::voice::{NoteRequest, Voice, VoiceId};
use crate::voice_pool::{Allocation, VoicePool};

/// Real-time audio engine.
///
/// Owns the event queue, voice pool and clock, and renders stereo audio
/// in lockstep with the host's transport. This struct runs exclusively on
/// the audio thread: after construction it never allocates, locks or logs
/// inside the frame loop.
pub struct Engine {
    config: EngineConfig,
    clock: Clock,
    queue: EventQueue,
    pool: VoicePool,
    bus: MasterBus,

    /// Per-track sound and parameters, written by the host thread.
    tracks: Arc<TrackTable>,

    playing: bool,

    /// The next render must move the queue cursor to the current position.
    resync: bool,

    /// Loop-relative beat position of the last rendered frame.
    position: f64,

    /// Absolute beat of the last frame rendered while playing.
    last_beat: Option<f64>,

    /// Frames rendered since construction; orders voice onsets.
    frame_counter: u64,
}

impl Engine {
    /// Build an engine, allocating everything it will ever need.
    pub fn new(config: EngineConfig) -> ConfigResult<Self> {
        config.validate()?;
        let tracks = Arc::new(TrackTable::new(config.tracks));
        Ok(Self {
            clock: Clock::new(config.sample_rate),
            queue: EventQueue::new(config.is_looping()),
            pool: VoicePool::new(config.layout, config.tracks, config.sample_rate),
            bus: MasterBus::new(&config.effects, config.sample_rate),
            tracks,
            playing: true,
            resync: true,
            position: 0.0,
            last_beat: None,
            frame_counter: 0,
            config,
        })
    }

    // -------------------------------
    // MARK: Commands
    // -------------------------------

    /// Apply one command from the host thread.
    ///
    /// Called between render calls, never inside the frame loop.
    pub fn apply(&mut self, command: Command, notify: &mut dyn Notifier) {
        match command {
            Command::Schedule(event) => self.schedule(event),
            Command::ClearEvents => self.queue.clear(),
            Command::NoteOn(note) => {
                if is_valid_note(note.pitch, note.velocity, note.track, self.tracks.len()) {
                    let sound = self.tracks.sound(note.track as usize);
                    self.start_note(NoteRequest::new(note, sound, None), notify);
                }
            }
            Command::NoteOff { pitch, track } => {
                if self.pool.release(pitch, track) {
                    notify.note_played(false, pitch, track);
                }
            }
            Command::SetPlaying(playing) => self.set_playing(playing, notify),
        }
    }

    fn schedule(&mut self, event: Event) {
        if !event.is_playable(self.tracks.len()) {
            return;
        }
        if self.queue.push(event).is_err() {
            warn!(
                "Event queue full ({} events), dropping event at beat {}",
                self.queue.len(),
                event.beat_time
            );
        }
    }

    fn set_playing(&mut self, playing: bool, notify: &mut dyn Notifier) {
        if playing == self.playing {
            return;
        }
        self.playing = playing;

        if playing {
            self.resync = true;
            return;
        }

        let note_off = |note: &Note| notify.note_played(false, note.pitch, note.track);
        match self.config.pause_policy {
            PausePolicy::Decay => self.pool.release_all(note_off),
            PausePolicy::Freeze => {}
            PausePolicy::Cut => self.pool.fade_all(note_off),
        }
    }

    fn start_note(&mut self, request: NoteRequest, notify: &mut dyn Notifier) {
        let Some(allocation) = self
            .pool
            .allocate(request, self.frame_counter, &self.tracks)
        else {
            return;
        };
        if let Allocation::Stolen {
            previous: Some(previous),
            ..
        } = allocation
        {
            notify.note_played(false, previous.pitch, previous.track);
        }
        notify.note_played(true, request.note.pitch, request.note.track);
    }

    // -------------------------------
    // MARK: Render
    // -------------------------------

    /// Render `min(out_l.len(), out_r.len())` frames starting at the host's
    /// `sample_time`, at `tempo` BPM.
    pub fn render(
        &mut self,
        out_l: &mut [f32],
        out_r: &mut [f32],
        sample_time: i64,
        tempo: f32,
        notify: &mut dyn Notifier,
    ) {
        let frames = out_l.len().min(out_r.len());
        let discontinuous = self.clock.begin_block(sample_time, tempo);

        if self.playing && (discontinuous || self.resync) {
            let beat = self.clock.beat_at(sample_time);
            // Scheduled releases keep their remaining length on the new timeline.
            if let Some(last) = self.last_beat {
                self.pool.shift_releases(beat - last);
            }
            self.position = self.loop_position(beat);
            self.queue.seek(self.position);
            self.resync = false;
        }

        let interval = self.config.progress_interval.max(1);
        let gain = self.config.master_gain;

        for (i, (left, right)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
            if self.playing {
                let beat = self.clock.beat_at(sample_time + i as i64);
                self.advance(beat, notify);
                if i % interval == 0 {
                    notify.playback_progress(self.position as f32);
                }
            }

            let (l, r) = self.pool.process(&self.tracks, |note| {
                notify.note_played(false, note.pitch, note.track)
            });
            (*left, *right) = self.bus.process(l * gain, r * gain);
            self.frame_counter += 1;
        }

        self.clock.end_block(sample_time + frames as i64);
    }

    /// Move the transport to `beat`: fire due events, then due releases.
    #[inline]
    fn advance(&mut self, beat: f64, notify: &mut dyn Notifier) {
        let position = self.loop_position(beat);
        self.last_beat = Some(beat);

        if self.queue.is_looping() && position < self.position {
            // Wrapped: finish the old cycle before starting the new one.
            let end = self.config.loop_length;
            while let Some(event) = self.queue.pop_due(end) {
                self.fire(event, beat - position - end, notify);
            }
            self.queue.rewind();
        }
        self.position = position;

        while let Some(event) = self.queue.pop_due(position) {
            self.fire(event, beat - position, notify);
        }

        self.pool.release_due(beat, |note| {
            notify.note_played(false, note.pitch, note.track)
        });
    }

    /// Start `event`; `cycle_start` is the absolute beat of the timeline
    /// origin it is relative to.
    #[inline]
    fn fire(&mut self, event: Event, cycle_start: f64, notify: &mut dyn Notifier) {
        let release_at = cycle_start + event.beat_time as f64 + event.duration_beats();
        let sound = self.tracks.sound(event.track as usize);
        let request = NoteRequest::new(event.note(), sound, Some(release_at));
        self.start_note(request, notify);
    }

    #[inline]
    fn loop_position(&self, beat: f64) -> f64 {
        if self.config.is_looping() {
            beat.rem_euclid(self.config.loop_length)
        } else {
            beat
        }
    }

    // -------------------------------
    // MARK: Readback
    // -------------------------------

    pub fn tracks(&self) -> &Arc<TrackTable> {
        &self.tracks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Loop-relative beat position of the last rendered frame.
    pub fn beat_position(&self) -> f64 {
        self.position
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    pub fn steal_count(&self) -> u64 {
        self.pool.steal_count()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.pending()
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.pool.get(id)
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.pool.iter()
    }
}
