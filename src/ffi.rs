// C-compatible FFI bindings matching include/cp3_dsp.h.
//
// Safety requirements:
// - Engine pointers must come from `engine_init`/`engine_init_with_config`
//   and must not be used after `engine_free`
// - `engine_init` and `engine_free` must be serialised with every other call
//   on the same engine by the host
// - `render` must only be called from one thread at a time (the audio thread)
// - Output buffers must hold at least `num_frames` floats

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::bridge::{Controller, EngineHandle, create_engine};
use crate::config::{
    DEFAULT_MASTER_GAIN, DEFAULT_PROGRESS_INTERVAL, DEFAULT_SAMPLE_RATE, DEFAULT_TRACKS,
    EffectsConfig, EngineConfig, PausePolicy, VOICE_LAYOUT_V1, VOICE_LAYOUT_V2, VoiceLayout,
};
use crate::event::{Event, Note};
use crate::notify::{self, GlobalCallbacks, NotePlayedCallback, PlaybackProgressCallback};

use log::{debug, error, info};

// Logger subsystem identifier
#[cfg(feature = "ios")]
const LOG_SUBSYSTEM: &str = "com.cp3.dsp";

/// `Cp3Config::voice_layout` value selecting [`VOICE_LAYOUT_V1`].
pub const CP3_VOICE_LAYOUT_V1: u32 = 1;

/// `Cp3Config::voice_layout` value selecting [`VOICE_LAYOUT_V2`].
pub const CP3_VOICE_LAYOUT_V2: u32 = 2;

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup. Messages appear in Console.app and
/// Xcode's debug console.
#[cfg(feature = "ios")]
#[unsafe(no_mangle)]
pub extern "C" fn cp3_init_logger() {
    oslog::OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(log::LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Type
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque engine handle.
///
/// The host thread only touches `controller`; `render` only touches `handle`.
pub struct Engine {
    controller: Controller,
    handle: EngineHandle,
}

/// Most recently initialised engine, target of the handle-less legacy calls.
static LEGACY_ENGINE: AtomicPtr<Engine> = AtomicPtr::new(ptr::null_mut());

/// Run `f` against the legacy routing target, if any.
fn with_legacy_engine(f: impl FnOnce(&Controller)) {
    let engine = LEGACY_ENGINE.load(Ordering::Acquire);
    if engine.is_null() {
        debug!("No engine initialised, dropping legacy call");
        return;
    }
    // SAFETY: the slot is cleared by `engine_free` before the engine is
    // dropped, and the host serialises `engine_free` with every other call.
    f(unsafe { &(*engine).controller });
}

/// Borrow the host-side half of an engine.
///
/// # Safety
/// `engine` must be null or a live pointer from `engine_init`.
unsafe fn controller<'a>(engine: *const Engine) -> Option<&'a Controller> {
    debug_assert!(!engine.is_null(), "null engine handle");
    if engine.is_null() {
        return None;
    }
    Some(unsafe { &(*engine).controller })
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating an engine.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Cp3Config {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f32,
    /// Number of tracks (1..=127).
    pub tracks: u32,
    /// `CP3_VOICE_LAYOUT_V1` (shared pool) or `CP3_VOICE_LAYOUT_V2` (per track).
    pub voice_layout: u32,
    /// Voices in the shared pool, or per track.
    pub voices: u32,
    /// 0 = decay, 1 = freeze, 2 = cut.
    pub pause_policy: u32,
    /// Loop length in beats; 0 plays a linear timeline.
    pub loop_length: f64,
    /// Frames between progress callbacks.
    pub progress_interval: u32,
    /// Gain applied to the mixed output.
    pub master_gain: f32,
    /// Master reverb send, 0..=1 (0 bypasses the reverb).
    pub reverb_send: f32,
    pub reverb_decay: f32,
    /// Master delay send, 0..=1 (0 bypasses the delay).
    pub delay_send: f32,
    /// Delay time in seconds.
    pub delay_time: f32,
    pub delay_feedback: f32,
    /// Enable the output limiter.
    pub limiter: bool,
    pub limiter_threshold: f32,
}

impl Default for Cp3Config {
    fn default() -> Self {
        let effects = EffectsConfig::default();
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            tracks: DEFAULT_TRACKS as u32,
            voice_layout: CP3_VOICE_LAYOUT_V2,
            voices: VOICE_LAYOUT_V2.voices() as u32,
            pause_policy: 0,
            loop_length: 0.0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL as u32,
            master_gain: DEFAULT_MASTER_GAIN,
            reverb_send: effects.reverb_send,
            reverb_decay: effects.reverb_decay,
            delay_send: effects.delay_send,
            delay_time: effects.delay_time,
            delay_feedback: effects.delay_feedback,
            limiter: effects.limiter,
            limiter_threshold: effects.limiter_threshold,
        }
    }
}

impl From<Cp3Config> for EngineConfig {
    fn from(c: Cp3Config) -> Self {
        let voices = c.voices as usize;
        let layout = match c.voice_layout {
            CP3_VOICE_LAYOUT_V1 => VoiceLayout::Shared { voices },
            _ => VoiceLayout::PerTrack { voices },
        };
        Self {
            sample_rate: c.sample_rate,
            tracks: c.tracks as usize,
            layout,
            pause_policy: PausePolicy::from_raw(c.pause_policy),
            loop_length: c.loop_length,
            progress_interval: c.progress_interval as usize,
            master_gain: c.master_gain,
            effects: EffectsConfig {
                reverb_send: c.reverb_send,
                reverb_decay: c.reverb_decay,
                delay_send: c.delay_send,
                delay_time: c.delay_time,
                delay_feedback: c.delay_feedback,
                limiter: c.limiter,
                limiter_threshold: c.limiter_threshold,
            },
        }
    }
}

/// Get the default configuration values.
#[unsafe(no_mangle)]
pub extern "C" fn cp3_default_config() -> Cp3Config {
    Cp3Config::default()
}

/// Default configuration with the first-revision layout (8 shared voices).
#[unsafe(no_mangle)]
pub extern "C" fn cp3_legacy_config() -> Cp3Config {
    Cp3Config {
        voice_layout: CP3_VOICE_LAYOUT_V1,
        voices: VOICE_LAYOUT_V1.voices() as u32,
        ..Cp3Config::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Callbacks
// ═══════════════════════════════════════════════════════════════════════════

/// Register the progress callback (process-wide). NULL clears it.
#[unsafe(no_mangle)]
pub extern "C" fn set_playback_progress_callback(callback: Option<PlaybackProgressCallback>) {
    notify::set_progress_callback(callback);
}

/// Register the note-played callback (process-wide). NULL clears it.
#[unsafe(no_mangle)]
pub extern "C" fn set_note_played_callback(callback: Option<NotePlayedCallback>) {
    notify::set_note_played_callback(callback);
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Create an engine with the default configuration at `sample_rate`.
///
/// Returns NULL if the sample rate is not positive and finite.
#[unsafe(no_mangle)]
pub extern "C" fn engine_init(sample_rate: f32) -> *mut Engine {
    engine_init_with_config(Cp3Config {
        sample_rate,
        ..Cp3Config::default()
    })
}

/// Create an engine with a custom configuration.
///
/// Returns NULL if the configuration is invalid. The new engine becomes the
/// target of the handle-less `add_event`, `clear_events` and
/// `set_parameter`.
#[unsafe(no_mangle)]
pub extern "C" fn engine_init_with_config(config: Cp3Config) -> *mut Engine {
    let config = EngineConfig::from(config);
    match create_engine(config) {
        Ok((controller, handle)) => {
            info!(
                "Engine created: {} Hz, {} tracks, {:?}",
                config.sample_rate, config.tracks, config.layout
            );
            let engine = Box::into_raw(Box::new(Engine { controller, handle }));
            LEGACY_ENGINE.store(engine, Ordering::Release);
            engine
        }
        Err(e) => {
            error!("Failed to create engine: {}", e);
            ptr::null_mut()
        }
    }
}

/// Destroy an engine.
///
/// # Safety
/// `ptr` must be NULL or a pointer returned by `engine_init`, not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_free(ptr: *mut Engine) {
    if ptr.is_null() {
        return;
    }
    let _ = LEGACY_ENGINE.compare_exchange(
        ptr,
        std::ptr::null_mut(),
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    unsafe { drop(Box::from_raw(ptr)) };
    debug!("Engine freed");
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Play or pause the transport.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn set_play_pause(engine: *mut Engine, is_playing: bool) {
    if let Some(controller) = unsafe { controller(engine) } {
        controller.set_play_pause(is_playing);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════

/// Schedule an event on the most recently initialised engine.
#[unsafe(no_mangle)]
pub extern "C" fn add_event(
    beat_time: f32,
    pitch: i8,
    velocity: i8,
    duration: f32,
    track: i8,
    param1: f32,
    param2: f32,
) {
    let event =
        Event::new(beat_time, pitch, velocity, duration, track).with_params(param1, param2);
    with_legacy_engine(|controller| {
        controller.add_event(event);
    });
}

/// Schedule an event.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_add_event(
    engine: *mut Engine,
    beat_time: f32,
    pitch: i8,
    velocity: i8,
    duration: f32,
    track: i8,
    param1: f32,
    param2: f32,
) {
    if let Some(controller) = unsafe { controller(engine) } {
        let event =
            Event::new(beat_time, pitch, velocity, duration, track).with_params(param1, param2);
        controller.add_event(event);
    }
}

/// Drop every pending event on the most recently initialised engine.
#[unsafe(no_mangle)]
pub extern "C" fn clear_events() {
    with_legacy_engine(|controller| {
        controller.clear_events();
    });
}

/// Drop every pending event.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_clear_events(engine: *mut Engine) {
    if let Some(controller) = unsafe { controller(engine) } {
        controller.clear_events();
    }
}

/// Start a note immediately (at the next render call).
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn note_on(
    engine: *mut Engine,
    pitch: i8,
    velocity: i8,
    track: i8,
    param1: f32,
    param2: f32,
) {
    if let Some(controller) = unsafe { controller(engine) } {
        controller.note_on(Note {
            pitch,
            velocity,
            track,
            param1,
            param2,
        });
    }
}

/// Release a note immediately (at the next render call).
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn note_off(engine: *mut Engine, pitch: i8, track: i8) {
    if let Some(controller) = unsafe { controller(engine) } {
        controller.note_off(pitch, track);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tracks
// ═══════════════════════════════════════════════════════════════════════════

/// Select the sound for subsequent notes on `track`.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn set_sound(engine: *mut Engine, sound: i8, track: i8) {
    if let Some(controller) = unsafe { controller(engine) } {
        controller.set_sound(track, sound);
    }
}

/// Set a track parameter on the most recently initialised engine.
#[unsafe(no_mangle)]
pub extern "C" fn set_parameter(parameter: i8, value: f32, track: i8) {
    with_legacy_engine(|controller| {
        controller.set_parameter(track, parameter, value);
    });
}

/// Set a track parameter.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_set_parameter(
    engine: *mut Engine,
    parameter: i8,
    value: f32,
    track: i8,
) {
    if let Some(controller) = unsafe { controller(engine) } {
        controller.set_parameter(track, parameter, value);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audio Rendering
// ═══════════════════════════════════════════════════════════════════════════

/// Render `num_frames` stereo frames.
///
/// Pending commands are applied first. If the engine or either buffer is
/// NULL, any non-NULL buffer is filled with silence.
///
/// # Safety
/// - Must be called from the audio thread
/// - `engine` must be a valid engine pointer
/// - `buf_l` and `buf_r` must have space for `num_frames` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn render(
    engine: *mut Engine,
    buf_l: *mut f32,
    buf_r: *mut f32,
    sample_time: i64,
    tempo: f32,
    num_frames: i32,
) {
    debug_assert!(!engine.is_null(), "null engine handle");
    debug_assert!(!buf_l.is_null() && !buf_r.is_null(), "null output buffer");

    let frames = num_frames.max(0) as usize;
    if frames == 0 {
        return;
    }

    if engine.is_null() || buf_l.is_null() || buf_r.is_null() {
        if !buf_l.is_null() {
            unsafe { std::ptr::write_bytes(buf_l, 0, frames) };
        }
        if !buf_r.is_null() {
            unsafe { std::ptr::write_bytes(buf_r, 0, frames) };
        }
        return;
    }

    let out_l = unsafe { std::slice::from_raw_parts_mut(buf_l, frames) };
    let out_r = unsafe { std::slice::from_raw_parts_mut(buf_r, frames) };
    let handle = unsafe { &mut (*engine).handle };
    handle.render(out_l, out_r, sample_time, tempo, &mut GlobalCallbacks);
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback
// ═══════════════════════════════════════════════════════════════════════════

/// Whether the transport is playing.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_is_playing(engine: *const Engine) -> bool {
    unsafe { controller(engine) }.is_some_and(|c| c.is_playing())
}

/// Number of voices sounding after the last render call.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_get_active_voices(engine: *const Engine) -> u32 {
    unsafe { controller(engine) }.map_or(0, |c| c.readback().active_voices as u32)
}

/// Loop-relative beat position at the end of the last render call.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_get_beat_position(engine: *const Engine) -> f64 {
    unsafe { controller(engine) }.map_or(0.0, |c| c.readback().beat_position)
}

/// Total voice steals since the engine was created.
///
/// # Safety
/// `engine` must be a valid engine pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn engine_get_steal_count(engine: *const Engine) -> u64 {
    unsafe { controller(engine) }.map_or(0, |c| c.readback().steal_count)
}
