//! This module contains a struct composing the devices together as a single
//! FM voice: an [algo::Algorithm] of operators, an LFO, a pitch envelope and
//! portamento.

use crate::context::{Context, Controllers};
use crate::devices::{EnvInput, Envelope, Lfo, Ramp};
use crate::patch::Patch;
use crate::status::VoiceStatus;
use crate::CONTROL_RATE;

use self::algo::{Algorithm, Modulation};

pub mod algo;

const NO_KEY: i32 = -256;
// glide runs in pitch units << 8
const MAX_PITCH: i32 = i32::MAX >> 8;

fn bit(key: i32) -> (usize, u64) {
    let key = key.clamp(0, 127) as u32;
    ((key >> 6) as usize, 1u64 << (key & 63))
}

/// A single voice.
///
/// Operators run at the sample rate, but the LFO, pitch envelope and glide
/// are only updated every [CONTROL_RATE] samples.  At each control period the
/// voice renders a block of [CONTROL_RATE] samples ahead and then returns
/// them one at a time.
#[derive(Clone)]
pub struct Voice {
    algo: Algorithm,
    lfo: Lfo,
    pitch_env: Envelope,
    glide: Ramp,
    counter: usize,
    key: i32,
    velocity: i32,
    // held keys, mono mode only
    keys: [u64; 2],
    output: [i32; CONTROL_RATE],
    lfo_out: i32,
    pitch: i32,
    pressure: i32,
    pressure_in: i32,
    priority: u64,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Voice {
    /// Create a silent voice.  `seed` seeds the LFO's noise source.
    pub fn new(seed: u64) -> Self {
        Self {
            algo: Algorithm::new(),
            lfo: Lfo::with_seed(seed),
            pitch_env: Envelope::with_level(0),
            glide: Ramp::new(0),
            counter: 0,
            key: NO_KEY,
            velocity: 0,
            keys: [0; 2],
            output: [0; CONTROL_RATE],
            lfo_out: 0,
            pitch: 0,
            pressure: 0,
            pressure_in: 0,
            priority: 0,
        }
    }

    /// Follow a changed patch without retriggering
    pub fn update(&mut self, patch: &Patch) {
        self.algo.update(patch);
        self.pitch_env.update(&patch.pitch_env);
        self.lfo.update(&patch.lfo);
    }

    fn hold(&mut self, key: i32, held: bool) {
        let (word, mask) = bit(key);
        if held {
            self.keys[word] |= mask;
        } else {
            self.keys[word] &= !mask;
        }
    }

    fn highest_key(&self) -> Option<i32> {
        if self.keys[1] != 0 {
            Some(127 - self.keys[1].leading_zeros() as i32)
        } else if self.keys[0] != 0 {
            Some(63 - self.keys[0].leading_zeros() as i32)
        } else {
            None
        }
    }

    /// Start (or, for zero velocity, release) `key`.
    ///
    /// In mono mode the voice tracks every held key and always sounds the
    /// highest: a lower key is remembered without retriggering, and releasing
    /// the sounding key falls back to the highest key still held.
    pub fn start(
        &mut self,
        context: &Context,
        patch: &Patch,
        key: i32,
        velocity: i32,
        controllers: &Controllers,
    ) {
        let mut key = key;
        let mut velocity = velocity;
        if patch.mono {
            if velocity > 0 {
                self.hold(key, true);
                if self.highest_key().is_some_and(|k| k > key) {
                    return;
                }
            } else {
                self.hold(key, false);
                if key != self.key {
                    return;
                }
                if let Some(k) = self.highest_key() {
                    key = k;
                    velocity = self.velocity;
                }
            }
        }

        let t = context.tables();
        let note = key.saturating_sub(patch.middle_c);
        let f = t.scale(note).saturating_add(patch.tuning).clamp(-MAX_PITCH, MAX_PITCH) << 8;
        if !patch.mono || self.velocity == 0 || velocity == 0 || patch.portamento <= 0 {
            self.glide.set(f, f, 1);
        } else {
            self.glide.set(self.glide.level(), f, patch.portamento);
        }

        self.key = key;
        self.velocity = velocity;

        let sustain = controllers.sustain;
        self.lfo.start(context, &patch.lfo, velocity, sustain);
        self.algo.start(context, patch, key, velocity, sustain);
        self.pitch_env
            .start_at(context, &patch.pitch_env, 0, velocity > 0, sustain);
    }

    /// Set the pressure (aftertouch) target, 0-127
    pub fn pressure(&mut self, pressure: u8) {
        self.pressure_in = i32::from(pressure) << 5;
    }

    /// Produce one sample
    pub fn step(&mut self, context: &Context, patch: &Patch, controllers: &Controllers) -> i32 {
        if self.pressure < self.pressure_in {
            self.pressure += 1;
        } else if self.pressure > self.pressure_in {
            self.pressure -= 1;
        }

        let index = self.counter % CONTROL_RATE;
        if index == 0 {
            let sustain = controllers.sustain;
            self.lfo_out = self.lfo.step(context, &patch.lfo, sustain);
            let bias = patch
                .pitch_env
                .pitch_bias(self.lfo_out, controllers.pitch_bend);
            let env = self.pitch_env.step(
                context,
                &patch.pitch_env,
                EnvInput {
                    count: CONTROL_RATE as i32,
                    bias,
                    sustain,
                },
            );
            self.glide.step(CONTROL_RATE as i32);
            self.pitch = patch
                .pitch_env
                .pitch_value(env)
                .saturating_add(self.glide.level() >> 8);

            let modulation = Modulation {
                lfo: self.lfo_out,
                pitch: self.pitch,
                expression: controllers.expression + self.pressure,
                sustain,
            };
            // run the operators a control period ahead
            self.algo
                .step(context, patch, &modulation, &mut self.output);
        }
        self.counter = self.counter.wrapping_add(1);
        self.output[index]
    }

    /// The key last started, if any
    pub fn key(&self) -> Option<i32> {
        (self.key != NO_KEY).then_some(self.key)
    }

    /// The voice stealing priority: the value of the engine's clock when this
    /// voice was last started
    pub fn priority(&self) -> u64 {
        self.priority
    }

    /// Set the voice stealing priority
    pub fn set_priority(&mut self, priority: u64) {
        self.priority = priority;
    }

    /// The current pitch, in pitch units, as of the last control period
    pub fn pitch(&self) -> i32 {
        self.pitch
    }

    /// Report the state of every envelope for display
    pub fn status(&self) -> VoiceStatus {
        VoiceStatus {
            key: self.key().and_then(|k| u8::try_from(k).ok()),
            triggered: self.velocity > 0,
            pressure: self.pressure,
            pitch: self.pitch_env.status(),
            lfo: self.lfo.status(),
            ops: self.algo.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Curve, Stage};
    use crate::tables::OCTAVE;

    fn mono() -> Patch {
        Patch {
            mono: true,
            ..Default::default()
        }
    }

    #[test]
    fn highest_held_key() {
        let mut v = Voice::new(0);
        assert_eq!(v.highest_key(), None);
        v.hold(3, true);
        v.hold(60, true);
        assert_eq!(v.highest_key(), Some(60));
        v.hold(64, true);
        v.hold(127, true);
        assert_eq!(v.highest_key(), Some(127));
        v.hold(127, false);
        assert_eq!(v.highest_key(), Some(64));
        v.hold(64, false);
        v.hold(60, false);
        assert_eq!(v.highest_key(), Some(3));
        v.hold(63, true);
        assert_eq!(v.highest_key(), Some(63));
    }

    #[test]
    fn mono_legato_returns_to_held_key() {
        let ctx = Context::new(44100).unwrap();
        let patch = mono();
        let ctrl = Controllers::default();
        let mut v = Voice::new(0);
        v.update(&patch);

        v.start(&ctx, &patch, 60, 100, &ctrl);
        v.start(&ctx, &patch, 64, 100, &ctrl);
        assert_eq!(v.key(), Some(64));
        v.start(&ctx, &patch, 64, 0, &ctrl);
        assert_eq!(v.key(), Some(60));
        assert!(v.status().triggered);

        for _ in 0..1000 {
            v.step(&ctx, &patch, &ctrl);
        }
        assert_eq!(v.pitch(), 0);
        assert!(v.status().ops[0].output > 0);
    }

    #[test]
    fn mono_lower_key_waits() {
        let ctx = Context::new(44100).unwrap();
        let patch = mono();
        let ctrl = Controllers::default();
        let mut v = Voice::new(0);
        v.update(&patch);

        v.start(&ctx, &patch, 72, 100, &ctrl);
        v.start(&ctx, &patch, 60, 100, &ctrl);
        assert_eq!(v.key(), Some(72));
        // releasing a key that isn't sounding changes nothing
        v.start(&ctx, &patch, 60, 0, &ctrl);
        assert_eq!(v.key(), Some(72));
        assert!(v.status().triggered);
        v.start(&ctx, &patch, 72, 0, &ctrl);
        assert_eq!(v.key(), Some(72));
        assert!(!v.status().triggered);
    }

    #[test]
    fn glide_ramps_in_mono() {
        let ctx = Context::new(44100).unwrap();
        let mut patch = mono();
        patch.portamento = 0x100;
        let ctrl = Controllers::default();
        let mut v = Voice::new(0);
        v.update(&patch);

        // the first note is instant
        v.start(&ctx, &patch, 60, 100, &ctrl);
        v.step(&ctx, &patch, &ctrl);
        assert_eq!(v.pitch(), 0);

        v.start(&ctx, &patch, 72, 100, &ctrl);
        let mut last = 0;
        // 0x100 * 16 per control period is 16 pitch units
        for _ in 0..128 {
            for _ in 0..CONTROL_RATE {
                v.step(&ctx, &patch, &ctrl);
            }
            assert!(v.pitch() > last);
            last = v.pitch();
        }
        assert_eq!(last, 128 * 16);
        for _ in 0..100000 {
            v.step(&ctx, &patch, &ctrl);
        }
        assert_eq!(v.pitch(), OCTAVE);
    }

    #[test]
    fn poly_ignores_portamento() {
        let ctx = Context::new(44100).unwrap();
        let patch = Patch {
            portamento: 0x100,
            tuning: 7,
            ..Default::default()
        };
        let ctrl = Controllers::default();
        let mut v = Voice::new(0);
        v.update(&patch);
        v.start(&ctx, &patch, 60, 100, &ctrl);
        v.start(&ctx, &patch, 48, 100, &ctrl);
        v.step(&ctx, &patch, &ctrl);
        assert_eq!(v.pitch(), 7 - OCTAVE);
    }

    #[test]
    fn bend_moves_pitch() {
        let ctx = Context::new(44100).unwrap();
        let patch = Patch::default();
        let ctrl = Controllers {
            pitch_bend: 0x1000,
            ..Default::default()
        };
        let mut v = Voice::new(0);
        v.update(&patch);
        v.start(&ctx, &patch, 60, 100, &ctrl);
        v.step(&ctx, &patch, &ctrl);
        assert_eq!(v.pitch(), 0x1000);
    }

    #[test]
    fn pitch_env_restarts_from_zero() {
        let ctx = Context::new(44100).unwrap();
        let mut patch = Patch::default();
        patch.pitch_env.stages.push(Stage {
            goal: OCTAVE << 8,
            rate: 0x1000,
            curve: Curve::Pitch,
        });
        let ctrl = Controllers::default();
        let mut v = Voice::new(0);
        v.update(&patch);

        for _ in 0..2 {
            v.start(&ctx, &patch, 60, 100, &ctrl);
            for _ in 0..CONTROL_RATE {
                v.step(&ctx, &patch, &ctrl);
            }
            // one control period in
            assert_eq!(v.pitch(), 0x1_0000 >> 8);
            for _ in 0..1000 {
                v.step(&ctx, &patch, &ctrl);
            }
            assert_eq!(v.pitch(), OCTAVE);
            v.start(&ctx, &patch, 60, 0, &ctrl);
            for _ in 0..1000 {
                v.step(&ctx, &patch, &ctrl);
            }
            // no key up stage, so the release holds
            assert_eq!(v.pitch(), OCTAVE);
        }
    }

    #[test]
    fn extreme_tuning_saturates() {
        let ctx = Context::new(44100).unwrap();
        let patch = Patch {
            middle_c: i32::MIN,
            tuning: i32::MAX,
            ..Default::default()
        };
        let ctrl = Controllers::default();
        let mut v = Voice::new(0);
        v.update(&patch);
        v.start(&ctx, &patch, 127, 100, &ctrl);
        for _ in 0..100 {
            v.step(&ctx, &patch, &ctrl);
        }
        assert_eq!(v.pitch(), MAX_PITCH);
    }
}
