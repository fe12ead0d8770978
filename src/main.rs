// src/main.rs
//
// Offline sanity run: renders one looping bar through the bridge and
// prints what happened.

use cp3_dsp::{
    EffectsConfig, EngineConfig, Event, Notifier, Parameter, Sound, VOICE_LAYOUT_V1, create_engine,
};

/// ===============================
/// Console notifier
/// ===============================

#[derive(Default)]
struct Counter {
    note_ons: usize,
    note_offs: usize,
    last_beat: f32,
}

impl Notifier for Counter {
    fn playback_progress(&mut self, beat: f32) {
        self.last_beat = beat;
    }

    fn note_played(&mut self, is_on: bool, _pitch: i8, _track: i8) {
        if is_on {
            self.note_ons += 1;
        } else {
            self.note_offs += 1;
        }
    }
}

/// ===============================
/// Main
/// ===============================

fn main() {
    let sample_rate = 48_000.0;
    let tempo = 120.0;
    let block_frames = 256;
    let blocks = 400;

    let config = EngineConfig {
        layout: VOICE_LAYOUT_V1,
        loop_length: 4.0,
        effects: EffectsConfig {
            reverb_send: 0.2,
            delay_send: 0.15,
            ..EffectsConfig::default()
        },
        ..EngineConfig::with_sample_rate(sample_rate)
    };

    let (controller, mut engine) = match create_engine(config) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Failed to create engine: {}", e);
            return;
        }
    };

    // --------------------------------
    // Score: kick on every beat, bass line, string on the off-beats
    // --------------------------------

    controller.set_sound(0, Sound::Kick.id());
    controller.set_sound(1, Sound::Subtractive.id());
    controller.set_sound(2, Sound::Pluck.id());
    controller.set_parameter(1, Parameter::Tone as i8, 0.35);
    controller.set_parameter(1, Parameter::Resonance as i8, 0.6);

    for beat in 0..4 {
        let b = beat as f32;
        controller.add_event(Event::new(b, 36, 120, 0.25, 0));
        controller.add_event(Event::new(b, 40 + 2 * beat as i8, 100, 0.5, 1));
        controller.add_event(Event::new(b + 0.5, 64, 90, 0.25, 2).with_params(0.1, 0.0));
    }

    // --------------------------------
    // Render
    // --------------------------------

    println!("Rendering {} blocks of {} frames…", blocks, block_frames);

    let mut left = vec![0.0; block_frames];
    let mut right = vec![0.0; block_frames];
    let mut counter = Counter::default();
    let mut peak: f32 = 0.0;

    for block in 0..blocks {
        let sample_time = (block * block_frames) as i64;
        engine.render(&mut left, &mut right, sample_time, tempo, &mut counter);
        peak = left
            .iter()
            .chain(right.iter())
            .fold(peak, |m, x| m.max(x.abs()));
    }

    let readback = controller.readback();
    println!(
        "Rendered {:.2} s: {} note-ons, {} note-offs, {} steals",
        (blocks * block_frames) as f32 / sample_rate,
        counter.note_ons,
        counter.note_offs,
        readback.steal_count
    );
    println!(
        "Beat {:.3} (last progress {:.3}), {} active voices, peak {:.3}",
        readback.beat_position, counter.last_beat, readback.active_voices, peak
    );
}
