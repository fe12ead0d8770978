// src/lib.rs
//
// Library entry point for FFI consumers (iOS/Swift) and Rust hosts.

mod bridge;
mod config;
mod dsp;
mod engine;
mod event;
mod event_queue;
mod notify;
mod track;
mod transport;
mod voice;
mod voice_pool;

pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use bridge::{Controller, EngineHandle, EngineReadback, create_engine};
pub use config::{
    ConfigError, ConfigResult, EffectsConfig, EngineConfig, MAX_VOICES, PausePolicy,
    VOICE_LAYOUT_V1, VOICE_LAYOUT_V2, VoiceLayout,
};
pub use engine::Engine;
pub use event::{Command, Event, Note};
pub use notify::{GlobalCallbacks, Notifier, Silent};
pub use track::{Parameter, Sound, TrackTable};
pub use voice::VoiceState;
