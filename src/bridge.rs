//! Thread-safe bridge between the host thread and the audio engine.
//!
//! # Architecture
//!
//! - **Host thread** owns [`Controller`]
//! - **Audio thread** owns [`EngineHandle`] with the [`Engine`]
//! - Events, live notes and transport changes travel over a bounded MPSC
//!   channel drained at the start of every render call
//! - Track sounds and parameters are written straight into the shared
//!   atomic [`TrackTable`]
//! - Render state flows back through atomics
//!
//! # Usage
//!
//! ```ignore
//! let (controller, mut engine) = create_engine(EngineConfig::default())?;
//!
//! // Host thread: schedule and tweak
//! controller.add_event(Event::new(0.0, 69, 100, 1.0, 0));
//! controller.set_parameter(0, Parameter::Tone as i8, 0.4);
//!
//! // Audio thread: drain commands and render
//! engine.render(&mut left, &mut right, sample_time, 120.0, &mut GlobalCallbacks);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, SyncSender, TrySendError},
};

use log::{debug, warn};

use crate::config::{COMMAND_CAPACITY, ConfigResult, EngineConfig};
use crate::engine::Engine;
use crate::event::{Command, Event, Note, is_valid_note, is_valid_track};
use crate::notify::Notifier;
use crate::track::TrackTable;

/// Handle for the host thread.
///
/// Every method returns promptly and never waits on the audio thread.
pub struct Controller {
    /// Channel to send commands to the engine.
    command_tx: SyncSender<Command>,

    /// Track table shared with the engine.
    tracks: Arc<TrackTable>,

    /// Shared readback state (updated by engine, read by host).
    readback: Arc<SharedReadback>,
}

/// Handle for the audio thread containing the engine and its channel end.
pub struct EngineHandle {
    /// The audio engine (owned by audio thread).
    engine: Engine,

    /// Channel to receive commands from the host.
    command_rx: Receiver<Command>,

    /// Shared readback state (written by engine).
    readback: Arc<SharedReadback>,
}

/// Lock-free shared state for engine -> host readback.
struct SharedReadback {
    /// Beat position stored as f64 bits (no AtomicF64 in std)
    beat_position_bits: AtomicU64,
    active_voices: AtomicU64,
    steal_count: AtomicU64,
    playing: AtomicBool,
}

impl SharedReadback {
    fn new(playing: bool) -> Self {
        Self {
            beat_position_bits: AtomicU64::new(0.0_f64.to_bits()),
            active_voices: AtomicU64::new(0),
            steal_count: AtomicU64::new(0),
            playing: AtomicBool::new(playing),
        }
    }
}

/// Snapshot of render state as seen from the host thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineReadback {
    /// Loop-relative beat position at the end of the last render call.
    pub beat_position: f64,
    pub active_voices: usize,
    pub steal_count: u64,
    pub playing: bool,
}

/// Build an engine and the linked pair of handles around it.
pub fn create_engine(config: EngineConfig) -> ConfigResult<(Controller, EngineHandle)> {
    let engine = Engine::new(config)?;
    let (command_tx, command_rx) = mpsc::sync_channel(COMMAND_CAPACITY);
    let readback = Arc::new(SharedReadback::new(engine.is_playing()));

    let controller = Controller {
        command_tx,
        tracks: Arc::clone(engine.tracks()),
        readback: Arc::clone(&readback),
    };

    let engine_handle = EngineHandle {
        engine,
        command_rx,
        readback,
    };

    Ok((controller, engine_handle))
}

// ═══════════════════════════════════════════════════════════════════
// Controller - Host Thread API
// ═══════════════════════════════════════════════════════════════════

impl Controller {
    /// Queue a command for the next render call.
    ///
    /// Never blocks: a full channel drops the command with a warning.
    pub fn send(&self, cmd: Command) -> bool {
        match self.command_tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!("Command channel full, dropping {:?}", cmd);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Engine is gone, dropping command");
                false
            }
        }
    }

    /// Schedule an event. Unplayable events are ignored.
    pub fn add_event(&self, event: Event) -> bool {
        if !event.is_playable(self.tracks.len()) {
            debug!("Ignoring unplayable event {:?}", event);
            return false;
        }
        self.send(Command::Schedule(event))
    }

    /// Drop every pending event before the next render.
    pub fn clear_events(&self) -> bool {
        self.send(Command::ClearEvents)
    }

    pub fn note_on(&self, note: Note) -> bool {
        if !is_valid_note(note.pitch, note.velocity, note.track, self.tracks.len()) {
            debug!(
                "Ignoring note on (pitch {}, velocity {}, track {})",
                note.pitch, note.velocity, note.track
            );
            return false;
        }
        self.send(Command::NoteOn(note))
    }

    pub fn note_off(&self, pitch: i8, track: i8) -> bool {
        if !is_valid_track(track, self.tracks.len()) {
            debug!("Ignoring note off on unknown track {}", track);
            return false;
        }
        self.send(Command::NoteOff { pitch, track })
    }

    /// Play or pause the transport.
    pub fn set_play_pause(&self, playing: bool) -> bool {
        // Optimistic update for immediate host feedback
        self.readback.playing.store(playing, Ordering::Relaxed);
        self.send(Command::SetPlaying(playing))
    }

    /// Select the sound for subsequent notes on `track`.
    pub fn set_sound(&self, track: i8, sound: i8) -> bool {
        let applied = self.tracks.set_sound(track, sound);
        if !applied {
            debug!("Ignoring sound {} on track {}", sound, track);
        }
        applied
    }

    /// Write a track parameter; takes effect on sounding voices immediately.
    pub fn set_parameter(&self, track: i8, parameter: i8, value: f32) -> bool {
        let applied = self.tracks.set_parameter(track, parameter, value);
        if !applied {
            debug!(
                "Ignoring parameter {} = {} on track {}",
                parameter, value, track
            );
        }
        applied
    }

    pub fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    /// Get the current engine readback state.
    pub fn readback(&self) -> EngineReadback {
        EngineReadback {
            beat_position: f64::from_bits(
                self.readback.beat_position_bits.load(Ordering::Relaxed),
            ),
            active_voices: self.readback.active_voices.load(Ordering::Relaxed) as usize,
            steal_count: self.readback.steal_count.load(Ordering::Relaxed),
            playing: self.readback.playing.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.readback.playing.load(Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════════════════════════════
// EngineHandle - Audio Thread API
// ═══════════════════════════════════════════════════════════════════

impl EngineHandle {
    /// Apply all pending commands from the host, in order.
    ///
    /// Returns the number of commands applied.
    pub fn process_commands(&mut self, notify: &mut dyn Notifier) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.engine.apply(cmd, notify);
            applied += 1;
        }
        applied
    }

    /// Drain commands, render one block and publish readback.
    ///
    /// Call this once per audio block from the audio callback.
    #[inline]
    pub fn render(
        &mut self,
        out_l: &mut [f32],
        out_r: &mut [f32],
        sample_time: i64,
        tempo: f32,
        notify: &mut dyn Notifier,
    ) {
        self.process_commands(notify);
        self.engine.render(out_l, out_r, sample_time, tempo, notify);
        self.sync_readback();
    }

    /// Sync readback state from engine.
    pub fn sync_readback(&self) {
        self.readback
            .beat_position_bits
            .store(self.engine.beat_position().to_bits(), Ordering::Relaxed);
        self.readback
            .active_voices
            .store(self.engine.active_voices() as u64, Ordering::Relaxed);
        self.readback
            .steal_count
            .store(self.engine.steal_count(), Ordering::Relaxed);
        self.readback
            .playing
            .store(self.engine.is_playing(), Ordering::Relaxed);
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get a mutable reference to the engine.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
