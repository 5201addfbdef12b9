use super::*;

use crate::patch::{KeyScale, OperatorPatch, ScaleCurve};
use crate::status::EnvStatus;
use crate::tables::Tables;
use crate::{EG_MAX, EG_MIN};

/// Input to an [Operator] for one sample
#[derive(Clone, Copy, Debug, Default)]
pub struct OpInput {
    /// Output of the operator summed into this one, or zero
    pub sum: i32,
    /// Output of the modulating operator (or the feedback filter), or zero
    pub modulation: i32,
    /// The voice pitch, in pitch units.  Ignored by fixed operators.
    pub pitch: i32,
    /// The LFO output
    pub lfo: i32,
    /// Smoothed expression plus pressure
    pub expression: i32,
    /// True while the sustain pedal is held
    pub sustain: bool,
}

fn key_scale(t: &Tables, value: i32, scale: &KeyScale) -> i64 {
    let value = match scale.curve {
        ScaleCurve::Linear => i64::from(value) << 11,
        // 2^(value * 23/4096)
        ScaleCurve::Exponential => i64::from(t.pow2(value.saturating_mul(92))),
    };
    if scale.up {
        value
    } else {
        -value
    }
}

/// One FM operator: a sine oscillator, an envelope and level shaping.
///
/// The operator's level is computed on note on from the patch level, the
/// velocity and keyboard scaling, and is added to the envelope output in the
/// log domain.
#[derive(Clone, Default)]
pub struct Operator {
    osc: Oscillator,
    env: Envelope,
    level: i32,
    frequency: i32,
}

impl Operator {
    /// Constructor
    pub fn new() -> Self {
        Self {
            osc: Oscillator::new(),
            env: Envelope::new(),
            level: EG_MIN,
            frequency: 0,
        }
    }

    /// Follow a changed patch without retriggering
    pub fn update(&mut self, patch: &OperatorPatch) {
        self.env.update(&patch.env);
    }

    /// Start a note.  A velocity of zero releases the envelope and leaves the
    /// pitch and level alone.
    pub fn start(
        &mut self,
        context: &Context,
        patch: &OperatorPatch,
        key: i32,
        middle_c: i32,
        velocity: i32,
        sustain: bool,
    ) {
        if velocity == 0 {
            self.env.start(context, &patch.env, 0, false, sustain);
            return;
        }

        let rate_adj = key.saturating_sub(middle_c).saturating_mul(patch.rate_scale) >> 2;
        self.env.start(context, &patch.env, rate_adj, true, sustain);
        self.frequency = patch.frequency;

        let sensitivity = patch.velocity.clamp(0, 7);
        let velocity = velocity.saturating_sub(96) >> (7 - sensitivity);
        let mut level = i64::from(patch.level) + (i64::from(velocity) << 17);

        let t = context.tables();
        level += if key > patch.breakpoint {
            let distance = key.saturating_sub(patch.breakpoint);
            key_scale(t, distance.saturating_mul(patch.right.depth), &patch.right)
        } else {
            let distance = patch.breakpoint.saturating_sub(key);
            key_scale(t, distance.saturating_mul(patch.left.depth), &patch.left)
        };
        self.level = level.clamp(i64::from(EG_MIN), i64::from(EG_MAX)) as i32;

        if patch.resync {
            self.osc.reset();
        }
    }

    /// Run one sample and return this operator's output plus the sum input.
    /// The operator's own output (without the sum) is registered with
    /// `feedback`, if given.
    pub fn step(
        &mut self,
        context: &Context,
        patch: &OperatorPatch,
        input: OpInput,
        feedback: Option<&mut FeedbackFilter>,
    ) -> i32 {
        if !patch.enabled || self.env.is_idle() {
            if let Some(fb) = feedback {
                fb.input(0);
            }
            return input.sum;
        }

        let t = context.tables();
        let mut frequency = self.frequency;
        if !patch.fixed {
            frequency = frequency.saturating_add(input.pitch);
        }
        let (osc, negative) =
            self.osc
                .step(&Sine, t, t.pitch(frequency), input.modulation.wrapping_mul(4));

        let bias = patch.env.op_bias(input.lfo, input.expression);
        let env = self
            .env
            .step(
                context,
                &patch.env,
                EnvInput {
                    count: 1,
                    bias,
                    sustain: input.sustain,
                },
            )
            .saturating_add(self.level);

        let out = t.output(osc, env);
        let out = if negative { -out } else { out };
        if let Some(fb) = feedback {
            fb.input(out);
        }
        out.saturating_add(input.sum)
    }

    /// The level computed at the last note on
    pub fn level(&self) -> i32 {
        self.level
    }

    /// True if the operator's envelope has finished
    pub fn is_idle(&self) -> bool {
        self.env.is_idle()
    }

    /// Report the envelope state for display
    pub fn status(&self) -> EnvStatus {
        self.env.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::EnvelopePatch;

    fn sounding() -> OperatorPatch {
        OperatorPatch {
            level: EG_MAX,
            velocity: 7,
            env: EnvelopePatch::gate(0, 0),
            ..Default::default()
        }
    }

    #[test]
    fn idle_or_disabled_passes_sum() {
        let ctx = Context::new(44100).unwrap();
        let patch = sounding();
        let mut op = Operator::new();
        let mut fb = FeedbackFilter::new();
        fb.input(1234);
        let input = OpInput {
            sum: 77,
            ..Default::default()
        };
        // never started
        assert_eq!(op.step(&ctx, &patch, input, Some(&mut fb)), 77);
        assert_eq!(fb.step(127), 0);

        let disabled = OperatorPatch {
            enabled: false,
            ..sounding()
        };
        op.start(&ctx, &disabled, 60, 60, 100, false);
        assert_eq!(op.step(&ctx, &disabled, input, None), 77);
    }

    #[test]
    fn velocity_and_key_scaling() {
        let ctx = Context::new(44100).unwrap();
        let mut patch = sounding();
        patch.level = 0;
        let mut op = Operator::new();

        op.start(&ctx, &patch, 60, 60, 127, false);
        let loud = op.level();
        op.start(&ctx, &patch, 60, 60, 32, false);
        let soft = op.level();
        assert!(loud > soft);
        assert_eq!(loud, 31 << 17);

        // release keeps the level
        op.start(&ctx, &patch, 60, 60, 0, false);
        assert_eq!(op.level(), soft);

        patch.velocity = 0;
        patch.right.depth = 4;
        op.start(&ctx, &patch, 72, 60, 96, false);
        assert_eq!(op.level(), -((12 * 4) << 11));
        patch.right.up = true;
        patch.right.curve = ScaleCurve::Exponential;
        op.start(&ctx, &patch, 72, 60, 96, false);
        assert!(op.level() > 0);
        // left side is untouched
        op.start(&ctx, &patch, 48, 60, 96, false);
        assert_eq!(op.level(), 0);
    }

    #[test]
    fn level_is_clamped() {
        let ctx = Context::new(44100).unwrap();
        let mut patch = sounding();
        patch.left = KeyScale {
            depth: 127,
            curve: ScaleCurve::Exponential,
            up: false,
        };
        let mut op = Operator::new();
        op.start(&ctx, &patch, 0, 60, 1, false);
        assert_eq!(op.level(), EG_MIN);
        patch.left.up = true;
        op.start(&ctx, &patch, 0, 60, 127, false);
        assert_eq!(op.level(), EG_MAX);
    }

    #[test]
    fn extreme_patch_values_saturate() {
        let ctx = Context::new(44100).unwrap();
        let mut patch = sounding();
        patch.breakpoint = i32::MIN;
        patch.rate_scale = i32::MAX;
        patch.right = KeyScale {
            depth: i32::MAX,
            curve: ScaleCurve::Linear,
            up: true,
        };
        let mut op = Operator::new();
        op.start(&ctx, &patch, 127, i32::MIN, 127, false);
        assert_eq!(op.level(), EG_MAX);
        patch.breakpoint = i32::MAX;
        patch.left.depth = i32::MAX;
        op.start(&ctx, &patch, 0, i32::MAX, i32::MIN, false);
        assert_eq!(op.level(), EG_MIN);
        for _ in 0..100 {
            op.step(&ctx, &patch, OpInput::default(), None);
        }
    }

    #[test]
    fn oscillates_at_full_scale() {
        let ctx = Context::new(44100).unwrap();
        let patch = sounding();
        let mut op = Operator::new();
        let mut fb = FeedbackFilter::new();
        op.start(&ctx, &patch, 60, 60, 127, false);
        let mut min = 0;
        let mut max = 0;
        for _ in 0..4000 {
            let out = op.step(&ctx, &patch, OpInput::default(), Some(&mut fb));
            fb.step(127);
            min = min.min(out);
            max = max.max(out);
        }
        assert!(max > 0x70_0000 && max <= 0x80_0000);
        assert!(min < -0x70_0000 && min >= -0x80_0000);
        assert!(!op.is_idle());
    }
}
