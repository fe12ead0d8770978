//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { cp3_init, WebEngine } from './cp3_dsp.js';
//!
//! await init();
//! cp3_init();
//!
//! const engine = new WebEngine(48000);
//! engine.add_event(0, 69, 100, 1, 0, 0, 0);
//!
//! // In the AudioWorklet: interleaved stereo
//! engine.render(BigInt(sampleTime), 120, output);
//! const notes = engine.take_note_events(); // [is_on, pitch, track, ...]
//! ```

use heapless::Vec as BoundedVec;
use wasm_bindgen::prelude::*;

use crate::bridge::{Controller, EngineHandle, create_engine};
use crate::config::{EngineConfig, MAX_BUFFER_SIZE, PausePolicy};
use crate::event::{Event, Note};
use crate::notify::Notifier;

/// Note events buffered between two `take_note_events` calls.
const NOTE_LOG_CAPACITY: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn cp3_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════════════════════

/// Collects render notifications into preallocated storage.
struct NoteLog {
    notes: BoundedVec<(bool, i8, i8), NOTE_LOG_CAPACITY>,
    progress: f32,
}

impl Notifier for NoteLog {
    fn playback_progress(&mut self, beat: f32) {
        self.progress = beat;
    }

    fn note_played(&mut self, is_on: bool, pitch: i8, track: i8) {
        // Dropped once full.
        let _ = self.notes.push((is_on, pitch, track));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════

/// Engine for use inside an AudioWorklet.
///
/// The worklet owns both halves, so control calls and render happen on the
/// same thread.
#[wasm_bindgen]
pub struct WebEngine {
    controller: Controller,
    handle: EngineHandle,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
    log: NoteLog,
}

#[wasm_bindgen]
impl WebEngine {
    /// Create an engine with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f32) -> Result<WebEngine, JsError> {
        Self::with_options(sample_rate, 0.0, 0)
    }

    /// Create an engine with a loop length (0 = linear) and pause policy
    /// (0 = decay, 1 = freeze, 2 = cut).
    pub fn with_options(
        sample_rate: f32,
        loop_length: f64,
        pause_policy: u32,
    ) -> Result<WebEngine, JsError> {
        let config = EngineConfig {
            loop_length,
            pause_policy: PausePolicy::from_raw(pause_policy),
            ..EngineConfig::with_sample_rate(sample_rate)
        };
        let (controller, handle) = create_engine(config).map_err(|e| JsError::new(&e.to_string()))?;
        Ok(Self {
            controller,
            handle,
            scratch_l: vec![0.0; MAX_BUFFER_SIZE],
            scratch_r: vec![0.0; MAX_BUFFER_SIZE],
            log: NoteLog {
                notes: BoundedVec::new(),
                progress: 0.0,
            },
        })
    }

    /// Schedule an event.
    #[allow(clippy::too_many_arguments)]
    pub fn add_event(
        &self,
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
        self.controller.add_event(event);
    }

    pub fn clear_events(&self) {
        self.controller.clear_events();
    }

    pub fn note_on(&self, pitch: i8, velocity: i8, track: i8, param1: f32, param2: f32) {
        self.controller.note_on(Note {
            pitch,
            velocity,
            track,
            param1,
            param2,
        });
    }

    pub fn note_off(&self, pitch: i8, track: i8) {
        self.controller.note_off(pitch, track);
    }

    pub fn set_play_pause(&self, is_playing: bool) {
        self.controller.set_play_pause(is_playing);
    }

    pub fn set_sound(&self, sound: i8, track: i8) {
        self.controller.set_sound(track, sound);
    }

    pub fn set_parameter(&self, parameter: i8, value: f32, track: i8) {
        self.controller.set_parameter(track, parameter, value);
    }

    /// Render into an interleaved stereo buffer: [L0, R0, L1, R1, ...].
    ///
    /// Renders `output.len() / 2` frames starting at `sample_time`.
    pub fn render(&mut self, sample_time: i64, tempo: f32, output: &mut [f32]) {
        let total_frames = output.len() / 2;

        let mut offset = 0;
        while offset < total_frames {
            let chunk_frames = (total_frames - offset).min(MAX_BUFFER_SIZE);
            let left = &mut self.scratch_l[..chunk_frames];
            let right = &mut self.scratch_r[..chunk_frames];

            self.handle.render(
                left,
                right,
                sample_time + offset as i64,
                tempo,
                &mut self.log,
            );

            let out_chunk = &mut output[offset * 2..(offset + chunk_frames) * 2];
            for (frame, (l, r)) in out_chunk
                .chunks_exact_mut(2)
                .zip(left.iter().zip(right.iter()))
            {
                frame[0] = *l;
                frame[1] = *r;
            }

            offset += chunk_frames;
        }
    }

    /// Drain note notifications as flat `[is_on, pitch, track]` triples.
    pub fn take_note_events(&mut self) -> Vec<i32> {
        let out = self
            .log
            .notes
            .iter()
            .flat_map(|&(on, pitch, track)| [on as i32, pitch as i32, track as i32])
            .collect();
        self.log.notes.clear();
        out
    }

    /// Position reported by the most recent progress notification.
    pub fn playback_progress(&self) -> f32 {
        self.log.progress
    }

    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    pub fn active_voices(&self) -> u32 {
        self.controller.readback().active_voices as u32
    }

    pub fn beat_position(&self) -> f64 {
        self.controller.readback().beat_position
    }

    pub fn steal_count(&self) -> u64 {
        self.controller.readback().steal_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_log_drops_past_capacity() {
        let mut log = NoteLog {
            notes: BoundedVec::new(),
            progress: 0.0,
        };
        for i in 0..NOTE_LOG_CAPACITY + 10 {
            log.note_played(true, (i % 128) as i8, 0);
        }
        log.playback_progress(1.5);

        assert_eq!(log.notes.len(), NOTE_LOG_CAPACITY);
        assert_eq!(log.notes[0], (true, 0, 0));
        assert_eq!(log.progress, 1.5);
    }
}
