// src/notify.rs
//
// Render -> host notifications.
//
// The renderer reports through the `Notifier` trait so it can be driven by
// tests without touching process state. The C ABI uses `GlobalCallbacks`,
// which forwards to the two process-wide callback registrations.

use std::sync::atomic::{AtomicPtr, Ordering};

/// `fn(beat_position)`
pub type PlaybackProgressCallback = extern "C" fn(f32);

/// `fn(is_on, pitch, track)`
pub type NotePlayedCallback = extern "C" fn(bool, i8, i8);

/// Sink for notifications produced during render.
///
/// Implementations are called on the render thread and must not block.
pub trait Notifier {
    fn playback_progress(&mut self, beat: f32);
    fn note_played(&mut self, is_on: bool, pitch: i8, track: i8);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Notifier for Silent {
    fn playback_progress(&mut self, _beat: f32) {}
    fn note_played(&mut self, _is_on: bool, _pitch: i8, _track: i8) {}
}

// ═══════════════════════════════════════════════════════════════════
// Process-wide registrations
// ═══════════════════════════════════════════════════════════════════

static PROGRESS_CALLBACK: AtomicPtr<()> = AtomicPtr::new(std::ptr::null_mut());
static NOTE_PLAYED_CALLBACK: AtomicPtr<()> = AtomicPtr::new(std::ptr::null_mut());

/// Register (or clear, with `None`) the progress callback.
pub fn set_progress_callback(callback: Option<PlaybackProgressCallback>) {
    let ptr = callback.map_or(std::ptr::null_mut(), |f| f as *mut ());
    PROGRESS_CALLBACK.store(ptr, Ordering::Release);
}

/// Register (or clear, with `None`) the note-played callback.
pub fn set_note_played_callback(callback: Option<NotePlayedCallback>) {
    let ptr = callback.map_or(std::ptr::null_mut(), |f| f as *mut ());
    NOTE_PLAYED_CALLBACK.store(ptr, Ordering::Release);
}

/// Drop both registrations.
pub fn clear_callbacks() {
    set_progress_callback(None);
    set_note_played_callback(None);
}

fn progress_callback() -> Option<PlaybackProgressCallback> {
    let ptr = PROGRESS_CALLBACK.load(Ordering::Acquire);
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the only non-null values stored are `PlaybackProgressCallback`s.
    Some(unsafe { std::mem::transmute::<*mut (), PlaybackProgressCallback>(ptr) })
}

fn note_played_callback() -> Option<NotePlayedCallback> {
    let ptr = NOTE_PLAYED_CALLBACK.load(Ordering::Acquire);
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the only non-null values stored are `NotePlayedCallback`s.
    Some(unsafe { std::mem::transmute::<*mut (), NotePlayedCallback>(ptr) })
}

/// Forwards to whatever callbacks are registered at the time of the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalCallbacks;

impl Notifier for GlobalCallbacks {
    #[inline]
    fn playback_progress(&mut self, beat: f32) {
        if let Some(callback) = progress_callback() {
            callback(beat);
        }
    }

    #[inline]
    fn note_played(&mut self, is_on: bool, pitch: i8, track: i8) {
        if let Some(callback) = note_played_callback() {
            callback(is_on, pitch, track);
        }
    }
}

/// Serialises tests that touch process-wide state: the callback registry
/// and the FFI legacy routing slot.
#[cfg(test)]
pub(crate) static GLOBAL_STATE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
