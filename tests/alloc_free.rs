//! Allocation-free render path tests.
//!
//! These tests verify that rendering never touches the heap, including
//! while events fire, voices get stolen, loops wrap through the master
//! effects and queued commands are drained.

use assert_no_alloc::{AllocDisabler, assert_no_alloc};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use cp3_dsp::{
    Command, EffectsConfig, Engine, EngineConfig, Event, Note, PausePolicy, Silent, Sound, VOICE_LAYOUT_V1,
    create_engine,
};

const BLOCK: usize = 256;

fn busy_score() -> Vec<Event> {
    let mut events = Vec::new();
    for step in 0..16 {
        let beat = step as f32 * 0.25;
        for track in 0..4 {
            events.push(Event::new(beat, 40 + step as i8 + track * 5, 100, 0.6, track));
        }
    }
    events
}

/// Render `blocks` blocks, aborting on any heap allocation.
fn assert_render_alloc_free(engine: &mut Engine, blocks: usize) {
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];

    assert_no_alloc(|| {
        for block in 0..blocks {
            let sample_time = (block * BLOCK) as i64;
            engine.render(&mut left, &mut right, sample_time, 132.0, &mut Silent);
        }
    });
}

#[test]
fn linear_score_with_steals_alloc_free() {
    let config = EngineConfig {
        layout: VOICE_LAYOUT_V1,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config).unwrap();
    for track in 0..4 {
        engine.tracks().set_sound(track, track);
    }
    for event in busy_score() {
        engine.apply(Command::Schedule(event), &mut Silent);
    }

    assert_render_alloc_free(&mut engine, 48_000 * 3 / BLOCK);
    assert!(engine.steal_count() > 0);
}

#[test]
fn looping_score_with_effects_alloc_free() {
    let config = EngineConfig {
        loop_length: 2.0,
        effects: EffectsConfig {
            reverb_send: 0.3,
            delay_send: 0.3,
            limiter: true,
            ..EffectsConfig::default()
        },
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config).unwrap();
    engine.tracks().set_sound(1, Sound::Pluck.id());
    for event in busy_score().into_iter().filter(|e| e.beat_time < 2.0) {
        engine.apply(Command::Schedule(event), &mut Silent);
    }

    assert_render_alloc_free(&mut engine, 48_000 * 5 / BLOCK);
}

#[test]
fn queued_commands_drain_alloc_free() {
    let config = EngineConfig {
        layout: VOICE_LAYOUT_V1,
        pause_policy: PausePolicy::Cut,
        ..EngineConfig::default()
    };
    let (controller, mut handle) = create_engine(config).unwrap();
    for event in busy_score() {
        controller.add_event(event);
    }
    let note = Note {
        pitch: 72,
        velocity: 110,
        track: 2,
        param1: 0.2,
        param2: 0.1,
    };

    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];

    let mut sample_time = 0;
    let mut render = |handle: &mut cp3_dsp::EngineHandle, blocks: usize| {
        assert_no_alloc(|| {
            for _ in 0..blocks {
                handle.render(&mut left, &mut right, sample_time, 120.0, &mut Silent);
                sample_time += BLOCK as i64;
            }
        });
    };

    render(&mut handle, 100);
    controller.note_on(note);
    controller.note_off(72, 2);
    controller.set_play_pause(false);
    render(&mut handle, 10);
    controller.set_play_pause(true);
    controller.clear_events();
    render(&mut handle, 100);
}
