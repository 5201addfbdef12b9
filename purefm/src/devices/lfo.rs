use super::*;

use crate::patch::LfoPatch;
use crate::status::EnvStatus;
use crate::CONTROL_RATE;

/// A low frequency oscillator with its own depth envelope.
///
/// The LFO is stepped once per control period (every [CONTROL_RATE] samples),
/// so its oscillator advances by a control period's worth of phase each step.
/// The output is a signed sample on the same scale as an operator's, used to
/// bias both the pitch envelope and the operator levels.
#[derive(Clone, Default)]
pub struct Lfo {
    osc: Oscillator,
    env: Envelope,
}

impl Lfo {
    /// Constructor
    pub fn new() -> Self {
        Self::with_seed(0)
    }
    /// Create an LFO whose noise source starts from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            osc: Oscillator::with_seed(seed),
            env: Envelope::new(),
        }
    }
    /// Follow a changed patch without retriggering
    pub fn update(&mut self, patch: &LfoPatch) {
        self.env.update(&patch.env);
    }
    /// Retrigger (or release, for zero velocity) the depth envelope
    pub fn start(&mut self, context: &Context, patch: &LfoPatch, velocity: i32, sustain: bool) {
        self.env.start(context, &patch.env, 0, velocity != 0, sustain);
        if velocity > 0 && patch.resync {
            self.osc.reset();
        }
    }
    /// Advance one control period
    pub fn step(&mut self, context: &Context, patch: &LfoPatch, sustain: bool) -> i32 {
        let t = context.tables();
        let increment = t.pitch(patch.frequency) * CONTROL_RATE as i64;
        let (osc, negative) = self.osc.step(&patch.wave, t, increment, 0);
        let env = self
            .env
            .step(
                context,
                &patch.env,
                EnvInput {
                    count: CONTROL_RATE as i32,
                    bias: 0,
                    sustain,
                },
            )
            .saturating_add(patch.level);
        let out = t.output(osc, env);
        if negative {
            -out
        } else {
            out
        }
    }
    /// Report the envelope state for display
    pub fn status(&self) -> EnvStatus {
        self.env.status()
    }
}

impl Device for Lfo {
    type Input = bool;
    type Params = LfoPatch;
    type Output = i32;
    fn next(&mut self, context: &Context, sustain: bool, params: &LfoPatch) -> i32 {
        self.step(context, params, sustain)
    }
}
