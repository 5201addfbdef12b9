//! Render a short phrase through the PureFM engine to a WAV file.
//!
//! Usage: `purefm_render [output.wav] [sample rate]`

use std::error::Error;
use std::thread;

use purefm::patch::{Curve, EnvelopePatch, KeyScale, OperatorPatch, Stage};
use purefm::tables::{Tables, OCTAVE};
use purefm::{patch_channel, Context, Engine, EngineConfig, Patch, EG_MAX};

const BLOCK: usize = 256;
// a single voice renders at 1/32 of full scale
const GAIN: f32 = 8.0;

fn env(stages: &[(i32, i32, Curve)], key_up: usize) -> EnvelopePatch {
    EnvelopePatch {
        stages: stages
            .iter()
            .map(|&(level, duration, curve)| Stage::from_values(level, duration, curve))
            .collect(),
        key_up: Some(key_up),
        expression: 7,
        lfo: 7,
        ..Default::default()
    }
}

/// A two stack electric piano: 0 <- 1 (with feedback) and 2 <- 3, with
/// operator 2 summed into the output
fn demo_patch() -> Patch {
    let mut patch = Patch::default();
    let tine = env(
        &[(127, 0, Curve::Attack), (96, 70, Curve::Exponential), (0, 50, Curve::Exponential)],
        2,
    );
    let bell = env(
        &[(127, 0, Curve::Attack), (40, 60, Curve::Exponential), (0, 40, Curve::Exponential)],
        2,
    );
    patch.ops[0] = OperatorPatch {
        sum: Some(2),
        modulation: Some(1),
        level: EG_MAX,
        velocity: 3,
        env: tine.clone(),
        ..Default::default()
    };
    patch.ops[1] = OperatorPatch {
        modulation: Some(1),
        level: Tables::level_param(100),
        velocity: 5,
        right: KeyScale {
            depth: 3,
            ..Default::default()
        },
        env: bell.clone(),
        ..Default::default()
    };
    patch.ops[2] = OperatorPatch {
        modulation: Some(3),
        level: Tables::level_param(110),
        velocity: 3,
        env: tine,
        ..Default::default()
    };
    patch.ops[3] = OperatorPatch {
        level: Tables::level_param(90),
        frequency: 3 * OCTAVE + 1187,
        velocity: 6,
        env: bell,
        ..Default::default()
    };
    patch.feedback = 40;
    patch.lfo.level = Tables::level_param(70);
    patch.pitch_env.lfo = 12;
    patch.pitch_env.bend = 3;
    patch
}

fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    run().inspect_err(|e| log::error!("Render failed: {}", e))
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "purefm.wav".to_string());
    let sample_rate = match args.next() {
        Some(s) => s.parse::<u32>()?,
        None => 48_000,
    };

    let context = Context::new(sample_rate)?;
    let mut engine = Engine::new(context, EngineConfig::default());

    let (publisher, mut receiver) = patch_channel();
    let control = thread::spawn(move || -> Result<_, purefm::Error> {
        let mut publisher = publisher;
        let patch = demo_patch();
        patch.validate()?;
        publisher.publish(patch);
        Ok(publisher)
    });
    let publisher = control
        .join()
        .map_err(|_| "control thread panicked")??;

    // (time in seconds, message)
    let score: &[(f32, [u8; 3])] = &[
        (0.0, [0x90, 48, 90]),
        (0.0, [0x90, 55, 80]),
        (0.0, [0x90, 64, 100]),
        (0.5, [0x90, 67, 110]),
        (1.0, [0x80, 67, 0]),
        (1.0, [0xb0, 1, 90]),
        (1.5, [0x90, 72, 120]),
        (2.0, [0xe0, 0x00, 0x30]),
        (2.5, [0x80, 72, 0]),
        (2.5, [0x80, 64, 0]),
        (2.5, [0x80, 55, 0]),
        (2.5, [0x80, 48, 0]),
        (2.5, [0xe0, 0x00, 0x40]),
    ];
    let length = (4 * sample_rate) as usize;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    log::info!("Rendering {} samples at {} Hz to {}", length, sample_rate, path);

    let mut buf = [0f32; BLOCK];
    let mut events = score.iter().peekable();
    let mut now = 0;
    while now < length {
        engine.sync(&mut receiver);
        let mut n = BLOCK.min(length - now);
        // split the block at the next event for sample accurate timing
        while let Some((time, message)) = events.peek() {
            let at = (time * sample_rate as f32) as usize;
            if at > now {
                n = n.min(at - now);
                break;
            }
            engine.midi(message);
            events.next();
        }
        engine.render(&mut buf[..n]);
        for smp in &buf[..n] {
            let s = (smp * GAIN).clamp(-1.0, 1.0);
            writer.write_sample((s * f32::from(i16::MAX)) as i16)?;
        }
        now += n;
    }
    writer.finalize()?;

    drop(engine);
    drop(receiver);
    let mut publisher = publisher;
    publisher.collect();
    log::info!("Wrote {}", path);
    Ok(())
}
