//! The patch data model.  A [Patch] is an immutable snapshot describing one
//! complete timbre; it is built on the control side, optionally checked with
//! [Patch::validate], and delivered to the audio thread through
//! [crate::handoff].  The engine only ever reads it.

use arrayvec::ArrayVec;

use crate::devices::Wave;
use crate::tables::Tables;
use crate::{Error, Result, EG_MAX, EG_MIN, MAX_STAGES, OPERATORS};

/// The shape of a single envelope stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Curve {
    /// Linear in the log domain, so exponential in amplitude
    #[default]
    Exponential,
    /// Linear in amplitude
    Linear,
    /// DX7 style attack: exponential, but slowing as it approaches the top
    Attack,
    /// Hold the goal level for the duration of the stage
    Delay,
    /// Identical to [Curve::Exponential], used by pitch envelopes
    Pitch,
}

/// One segment of an envelope
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stage {
    /// Target level, `[EG_MIN, EG_MAX]` (or a pitch offset, see
    /// [Tables::pitch_param])
    pub goal: i32,
    /// Increment per sample, see [Tables::duration_param]
    pub rate: i32,
    /// How the stage moves toward its goal
    pub curve: Curve,
}

impl Stage {
    /// Build a stage from 7 bit hardware style values
    pub fn from_values(level: i32, duration: i32, curve: Curve) -> Self {
        Self {
            goal: Tables::level_param(level),
            rate: Tables::duration_param(duration),
            curve,
        }
    }
}

/// Parameters for an [crate::devices::Envelope]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnvelopePatch {
    /// The stages, in order
    pub stages: ArrayVec<Stage, MAX_STAGES>,
    /// The stage entered on note off.  While the note is held, the envelope
    /// waits when it reaches this stage.
    pub key_up: Option<usize>,
    /// Return to the first stage after the last (or at the key up stage)
    /// while the note is held
    pub looped: bool,
    /// Expression sensitivity, as a right shift
    pub expression: u8,
    /// LFO sensitivity, as a right shift
    pub lfo: u8,
    /// Pitch bend range, as a right shift (pitch envelope only)
    pub bend: u8,
    /// Pitch envelope range, as a right shift (pitch envelope only)
    pub scale: u8,
}

impl EnvelopePatch {
    /// A simple organ-like envelope for an operator: rise to the top, hold
    /// while the key is down, then fall back to silence.  Durations are 7 bit
    /// values, see [Tables::duration_param].
    pub fn gate(attack: i32, release: i32) -> Self {
        let mut stages = ArrayVec::new();
        stages.push(Stage::from_values(127, attack, Curve::Attack));
        stages.push(Stage::from_values(0, release, Curve::Exponential));
        Self {
            stages,
            key_up: Some(1),
            expression: 7,
            lfo: 7,
            ..Default::default()
        }
    }

    /// The level bias for an operator envelope from the LFO output and the
    /// smoothed expression (plus pressure) value
    pub fn op_bias(&self, lfo: i32, expression: i32) -> i32 {
        let lfo = ((lfo >> 8) >> self.lfo.min(31)) << 8;
        let expression = (expression >> self.expression.min(31)) << 11;
        lfo.saturating_add(expression)
    }

    /// The pitch bias for a pitch envelope from the LFO output and the pitch
    /// bend, in the envelope's domain (see [EnvelopePatch::pitch_value])
    pub fn pitch_bias(&self, lfo: i32, bend: i32) -> i32 {
        let scale = u32::from(self.scale.min(7));
        let lfo = i64::from(lfo >> self.lfo.min(31)) << scale;
        let bend = i64::from(bend >> self.bend.min(31)) << (8 + scale);
        (lfo + bend).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Convert a pitch envelope output to pitch units
    pub fn pitch_value(&self, value: i32) -> i32 {
        value >> (8 + self.scale.min(7))
    }

    fn validate(&self) -> Result<()> {
        match self.key_up {
            Some(index) if index >= self.stages.len() => Err(Error::InvalidKeyUp {
                index,
                stages: self.stages.len(),
            }),
            _ => Ok(()),
        }
    }
}

/// The curve of one side of keyboard level scaling
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScaleCurve {
    /// Level changes in proportion to the distance from the breakpoint
    #[default]
    Linear,
    /// Level changes as a power of two of the distance
    Exponential,
}

/// Keyboard level scaling for one side of the breakpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyScale {
    /// Depth per key, 0 for no scaling
    pub depth: i32,
    /// The curve
    pub curve: ScaleCurve,
    /// Louder away from the breakpoint if true, quieter if false
    pub up: bool,
}

/// Parameters for a single operator
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OperatorPatch {
    /// Operator whose output is added to this one's
    pub sum: Option<usize>,
    /// Operator whose output phase modulates this one.  An index at or below
    /// this operator's own index is a feedback loop.
    pub modulation: Option<usize>,
    /// A disabled operator passes its sum input through
    pub enabled: bool,
    /// Output level, `[EG_MIN, EG_MAX]`
    pub level: i32,
    /// Velocity sensitivity, 0-7
    pub velocity: i32,
    /// Envelope rate adjustment per key from middle C
    pub rate_scale: i32,
    /// Key of the keyboard scaling breakpoint
    pub breakpoint: i32,
    /// Scaling below the breakpoint
    pub left: KeyScale,
    /// Scaling above the breakpoint
    pub right: KeyScale,
    /// Frequency in pitch units.  Relative to the played note unless fixed.
    pub frequency: i32,
    /// Ignore the played note and pitch modulation
    pub fixed: bool,
    /// Reset the oscillator phase on note on
    pub resync: bool,
    /// The operator's envelope
    pub env: EnvelopePatch,
}

impl Default for OperatorPatch {
    fn default() -> Self {
        Self {
            sum: None,
            modulation: None,
            enabled: true,
            level: EG_MIN,
            velocity: 0,
            rate_scale: 0,
            breakpoint: 60,
            left: KeyScale::default(),
            right: KeyScale::default(),
            frequency: 0,
            fixed: false,
            resync: false,
            env: EnvelopePatch::default(),
        }
    }
}

/// Parameters for the LFO
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LfoPatch {
    /// The waveform
    pub wave: Wave,
    /// Frequency in pitch units relative to middle C.  The LFO runs at the
    /// control rate, so useful values are well below zero.
    pub frequency: i32,
    /// Output level, `[EG_MIN, EG_MAX]`
    pub level: i32,
    /// Reset the phase on note on
    pub resync: bool,
    /// Envelope shaping the LFO depth
    pub env: EnvelopePatch,
}

impl Default for LfoPatch {
    fn default() -> Self {
        let mut stages = ArrayVec::new();
        stages.push(Stage {
            goal: EG_MAX,
            rate: Tables::duration_param(0),
            curve: Curve::Exponential,
        });
        Self {
            wave: Wave::Sine,
            frequency: -6 * crate::tables::OCTAVE,
            level: EG_MIN,
            resync: false,
            env: EnvelopePatch {
                stages,
                ..Default::default()
            },
        }
    }
}

/// A complete timbre
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patch {
    /// The operators.  Operator 0 is the output.
    pub ops: [OperatorPatch; OPERATORS],
    /// The pitch envelope
    pub pitch_env: EnvelopePatch,
    /// The LFO
    pub lfo: LfoPatch,
    /// Feedback amount, 0-127
    pub feedback: i32,
    /// Monophonic, with one voice per MIDI channel
    pub mono: bool,
    /// The MIDI key played at the operators' base frequency
    pub middle_c: i32,
    /// Glide rate in mono mode (0 for none), see [Tables::duration_param]
    pub portamento: i32,
    /// Global tuning offset in pitch units
    pub tuning: i32,
    /// The two controller numbers mapped to expression
    pub expression_controllers: [u8; 2],
}

impl Default for Patch {
    fn default() -> Self {
        let mut ops: [OperatorPatch; OPERATORS] = Default::default();
        ops[0].level = EG_MAX;
        ops[0].env = EnvelopePatch::gate(0, 40);
        Self {
            ops,
            pitch_env: EnvelopePatch::default(),
            lfo: LfoPatch::default(),
            feedback: 0,
            mono: false,
            middle_c: 60,
            portamento: 0,
            tuning: 0,
            expression_controllers: [1, 11],
        }
    }
}

impl Patch {
    /// Check the patch for wiring and envelope errors.  The engine tolerates
    /// invalid patches, treating bad indices as absent, so this is only a
    /// courtesy for editors before publishing.
    pub fn validate(&self) -> Result<()> {
        let res = self.check();
        if let Err(e) = &res {
            log::warn!("Invalid patch: {}", e);
        }
        res
    }

    fn check(&self) -> Result<()> {
        for (op, patch) in self.ops.iter().enumerate() {
            if let Some(input) = patch.sum {
                if input >= OPERATORS {
                    return Err(Error::InvalidWiring { op, input });
                }
                if input <= op {
                    return Err(Error::SumLoop { op, input });
                }
            }
            if let Some(input) = patch.modulation {
                if input >= OPERATORS {
                    return Err(Error::InvalidWiring { op, input });
                }
            }
            patch.env.validate()?;
        }
        self.pitch_env.validate()?;
        self.lfo.env.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_is_valid() {
        assert_eq!(Patch::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_wiring() {
        let mut p = Patch::default();
        p.ops[2].modulation = Some(8);
        assert_eq!(p.validate(), Err(Error::InvalidWiring { op: 2, input: 8 }));

        let mut p = Patch::default();
        p.ops[3].sum = Some(3);
        assert_eq!(p.validate(), Err(Error::SumLoop { op: 3, input: 3 }));

        // feedback through modulation is fine
        let mut p = Patch::default();
        p.ops[3].modulation = Some(3);
        p.ops[0].sum = Some(1);
        assert_eq!(p.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_key_up() {
        let mut p = Patch::default();
        p.ops[5].env.key_up = Some(0);
        assert_eq!(
            p.validate(),
            Err(Error::InvalidKeyUp {
                index: 0,
                stages: 0
            })
        );
    }

    #[test]
    fn bias_shifts() {
        let env = EnvelopePatch {
            lfo: 2,
            expression: 1,
            scale: 3,
            bend: 0,
            ..Default::default()
        };
        assert_eq!(env.op_bias(0x4000, 0), 0x1000);
        assert_eq!(env.op_bias(0, 0x20), 0x10 << 11);
        assert_eq!(env.pitch_value(env.pitch_bias(0, 100)), 100);
        assert_eq!(env.pitch_value(env.pitch_bias(0x1000, 0)), 0x1000 >> 10);

        // out of range shifts saturate rather than panic
        let env = EnvelopePatch {
            lfo: 200,
            expression: 200,
            scale: 200,
            bend: 200,
            ..Default::default()
        };
        assert_eq!(env.op_bias(0x7f_ffff, 0xfe0), 0);
        assert_eq!(env.pitch_value(env.pitch_bias(0x7f_ffff, 0x7fff)), 0);
    }
}
