use super::*;

use crate::patch::{Curve, EnvelopePatch};
use crate::status::EnvStatus;
use crate::tables::Tables;
use crate::{EG_MAX, EG_MIN};

/// A linear ramp toward a goal.  Used for each envelope stage and for
/// portamento.
#[derive(Clone, Debug)]
pub struct Ramp {
    level: i32,
    goal: i32,
    rate: i32,
}

impl Ramp {
    /// Create a ramp resting at `level`
    pub fn new(level: i32) -> Self {
        Self {
            level,
            goal: level,
            rate: 1,
        }
    }
    /// Start from `from` toward `to`, moving `rate` per step.  The rate is
    /// at least one so a ramp always finishes.
    pub fn set(&mut self, from: i32, to: i32, rate: i32) {
        self.level = from;
        self.goal = to;
        self.rate = rate.max(1);
    }
    /// Advance `count` steps, returning true once the goal is reached
    pub fn step(&mut self, count: i32) -> bool {
        self.advance(i64::from(self.rate) * i64::from(count))
    }
    /// Move `amount` toward the goal, returning true once it is reached
    pub fn advance(&mut self, amount: i64) -> bool {
        let level = i64::from(self.level);
        let goal = i64::from(self.goal);
        self.level = if level < goal {
            (level + amount).min(goal)
        } else {
            (level - amount).max(goal)
        } as i32;
        self.done()
    }
    /// True if the ramp has reached its goal
    pub fn done(&self) -> bool {
        self.level == self.goal
    }
    /// The current level
    pub fn level(&self) -> i32 {
        self.level
    }
    /// The goal
    pub fn goal(&self) -> i32 {
        self.goal
    }
    /// The rate per step
    pub fn rate(&self) -> i32 {
        self.rate
    }
}

/// Input to an [Envelope]
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvInput {
    /// Number of samples to advance
    pub count: i32,
    /// Added to the output without affecting the envelope's state
    pub bias: i32,
    /// True while the sustain pedal is held
    pub sustain: bool,
}

// envelope level to the amplitude domain, still on the envelope scale
fn to_linear(t: &Tables, value: i32) -> i32 {
    let value = value.clamp(EG_MIN, EG_MAX);
    EG_MIN + (t.exp((EG_MAX + 1 - value) >> 6) << 8)
}

fn from_linear(t: &Tables, level: i32) -> i32 {
    let i = (i64::from(level) - i64::from(EG_MIN)) >> 10;
    if i > 0 {
        EG_MAX - (t.log(i.min(0x3fff) as i32) << 6)
    } else {
        EG_MIN
    }
}

/// A multi-stage envelope generator.
///
/// This implements [Device], taking an [EnvInput] and an [EnvelopePatch].
///
/// Starting with a trigger enters the first stage.  Each stage ramps to its
/// goal and advances to the next.  While the key is held the envelope waits
/// when it reaches the key up stage (or after the last stage), unless it
/// loops.  A release jumps directly to the key up stage; without one the
/// output is frozen where it is.  The sustain pedal defers the release.
#[derive(Clone, Debug)]
pub struct Envelope {
    ramp: Ramp,
    out: i32,
    rate_adj: i32,
    stage: Option<usize>,
    key_up: Option<usize>,
    trigger: bool,
    running: bool,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// Create a silent envelope
    pub fn new() -> Self {
        Self::with_level(EG_MIN)
    }
    /// Create an idle envelope resting at `level`.  Pitch envelopes rest at
    /// zero.
    pub fn with_level(level: i32) -> Self {
        Self {
            ramp: Ramp::new(level),
            out: level,
            rate_adj: 0,
            stage: None,
            key_up: None,
            trigger: false,
            running: false,
        }
    }

    /// Follow a changed patch without retriggering
    pub fn update(&mut self, patch: &EnvelopePatch) {
        self.key_up = patch.key_up.filter(|&k| k < patch.stages.len());
        if self.stage.is_some_and(|s| s >= patch.stages.len()) {
            self.stage = None;
        }
    }

    /// Start (`trigger`) or release the envelope.  `rate_adj` is added to
    /// every stage's rate until the next start.
    pub fn start(
        &mut self,
        context: &Context,
        patch: &EnvelopePatch,
        rate_adj: i32,
        trigger: bool,
        sustain: bool,
    ) {
        self.trigger = trigger;
        self.key_up = patch.key_up.filter(|&k| k < patch.stages.len());
        if trigger {
            self.rate_adj = rate_adj;
            self.running = true;
            self.set(context.tables(), patch, Some(0));
        } else if !sustain {
            self.stop(context.tables(), patch);
        }
    }

    /// Like [Envelope::start], but a trigger first moves the output to
    /// `level`, so the first stage always ramps from there.  Pitch envelopes
    /// restart from zero on every note.
    pub fn start_at(
        &mut self,
        context: &Context,
        patch: &EnvelopePatch,
        level: i32,
        trigger: bool,
        sustain: bool,
    ) {
        if trigger {
            self.out = level;
            self.ramp = Ramp::new(level);
        }
        self.start(context, patch, 0, trigger, sustain);
    }

    fn stop(&mut self, t: &Tables, patch: &EnvelopePatch) {
        self.running = false;
        match self.key_up {
            Some(k) => self.set(t, patch, Some(k)),
            None => self.stage = None,
        }
    }

    fn set(&mut self, t: &Tables, patch: &EnvelopePatch, stage: Option<usize>) {
        let stage = match stage {
            Some(s) if s >= patch.stages.len() => {
                if self.running && patch.looped && !patch.stages.is_empty() {
                    Some(0)
                } else {
                    None
                }
            }
            s => s,
        };
        self.stage = stage;
        let Some(index) = stage else {
            return;
        };

        let st = &patch.stages[index];
        let rate = st.rate.saturating_add(self.rate_adj);
        match st.curve {
            Curve::Delay => {
                // the ramp only measures time
                self.out = st.goal;
                self.ramp.set(EG_MIN, EG_MAX, rate);
            }
            Curve::Linear => {
                self.ramp
                    .set(to_linear(t, self.out), to_linear(t, st.goal), rate);
            }
            _ => self.ramp.set(self.out, st.goal, rate),
        }
    }

    /// Advance `input.count` samples and return the output plus `input.bias`
    pub fn step(&mut self, context: &Context, patch: &EnvelopePatch, input: EnvInput) -> i32 {
        let t = context.tables();
        if self.running {
            if !self.trigger && !input.sustain {
                self.stop(t, patch);
            } else if self.stage.is_some() && self.stage == self.key_up {
                if !patch.looped {
                    return self.out.saturating_add(input.bias);
                }
                self.set(t, patch, Some(0));
            }
        }
        let Some(index) = self.stage.filter(|&s| s < patch.stages.len()) else {
            return self.out.saturating_add(input.bias);
        };
        let st = &patch.stages[index];

        let mut amount = i64::from(self.ramp.rate()) * i64::from(input.count.max(0));
        if st.curve == Curve::Attack && self.ramp.level() < self.ramp.goal() {
            // fast off the floor, slowing toward the top
            let distance = (i64::from(self.ramp.level()) - i64::from(EG_MIN)) >> 19;
            amount = (amount * (32 - distance) / 16).max(1);
        }
        let done = self.ramp.advance(amount);

        match st.curve {
            Curve::Exponential | Curve::Attack | Curve::Pitch => self.out = self.ramp.level(),
            Curve::Linear => {
                self.out = if done {
                    st.goal
                } else {
                    from_linear(t, self.ramp.level())
                };
            }
            Curve::Delay => {}
        }

        if done {
            self.set(t, patch, Some(index + 1));
        }
        self.out.saturating_add(input.bias)
    }

    /// True if the envelope has finished and is silent
    pub fn is_idle(&self) -> bool {
        self.stage.is_none() && !self.running && self.out <= EG_MIN
    }

    /// The current output, without bias
    pub fn output(&self) -> i32 {
        self.out
    }

    /// Report the stage and output for display
    pub fn status(&self) -> EnvStatus {
        EnvStatus {
            stage: self.stage,
            output: self.out >> 8,
        }
    }
}

impl Device for Envelope {
    type Input = EnvInput;
    type Params = EnvelopePatch;
    type Output = i32;
    fn next(&mut self, context: &Context, input: EnvInput, params: &EnvelopePatch) -> i32 {
        self.step(context, params, input)
    }
}
