//! The operator graph of a single voice.

use crate::context::Context;
use crate::devices::{FeedbackFilter, OpInput, Operator};
use crate::patch::Patch;
use crate::status::EnvStatus;
use crate::{CONTROL_RATE, OPERATORS};

/// One input edge of an operator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Input {
    /// Nothing is connected
    #[default]
    Zero,
    /// The output of another operator
    Operator(usize),
    /// The output of the feedback filter
    Feedback,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Node {
    sum: Input,
    modulation: Input,
}

/// Modulation shared by every operator for one control period
#[derive(Clone, Copy, Debug, Default)]
pub struct Modulation {
    /// The LFO output
    pub lfo: i32,
    /// The voice pitch, in pitch units
    pub pitch: i32,
    /// Smoothed expression plus pressure
    pub expression: i32,
    /// True while the sustain pedal is held
    pub sustain: bool,
}

/// Eight operators wired together by a patch.
///
/// Operators are computed from the highest index down, so an operator can
/// use the output of any higher numbered operator in the same sample.  A
/// modulation input at or below an operator's own index is a feedback loop,
/// and goes through the (single) feedback filter with a one sample delay.
/// Operator 0 is the output.
#[derive(Clone)]
pub struct Algorithm {
    ops: [Operator; OPERATORS],
    nodes: [Node; OPERATORS],
    outputs: [i32; OPERATORS],
    feedback: FeedbackFilter,
    feedback_source: Option<usize>,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithm {
    /// Constructor
    pub fn new() -> Self {
        Self {
            ops: core::array::from_fn(|_| Operator::new()),
            nodes: [Node::default(); OPERATORS],
            outputs: [0; OPERATORS],
            feedback: FeedbackFilter::new(),
            feedback_source: None,
        }
    }

    /// Rewire the operators for `patch` and pass the operator parameters
    /// along, without retriggering anything
    pub fn update(&mut self, patch: &Patch) {
        self.feedback_source = None;
        for (i, op) in patch.ops.iter().enumerate() {
            let sum = match op.sum {
                Some(s) if s < OPERATORS => Input::Operator(s),
                _ => Input::Zero,
            };
            let modulation = match op.modulation {
                Some(m) if m < OPERATORS && m <= i => {
                    // operators run from the top down, so the lowest source
                    // is the last to feed the filter
                    self.feedback_source = Some(self.feedback_source.map_or(m, |f| f.min(m)));
                    Input::Feedback
                }
                Some(m) if m < OPERATORS => Input::Operator(m),
                _ => Input::Zero,
            };
            self.nodes[i] = Node { sum, modulation };
            self.ops[i].update(op);
        }
    }

    /// The wiring of operator `op`, as `(sum, modulation)`
    pub fn wiring(&self, op: usize) -> Option<(Input, Input)> {
        self.nodes.get(op).map(|n| (n.sum, n.modulation))
    }

    /// Start (or release, for zero velocity) every operator
    pub fn start(&mut self, context: &Context, patch: &Patch, key: i32, velocity: i32, sustain: bool) {
        for (op, op_patch) in self.ops.iter_mut().zip(patch.ops.iter()) {
            op.start(context, op_patch, key, patch.middle_c, velocity, sustain);
        }
    }

    fn resolve(&self, input: Input) -> i32 {
        match input {
            Input::Zero => 0,
            Input::Operator(i) => self.outputs[i],
            Input::Feedback => self.feedback.output(),
        }
    }

    /// Render one control period into `out`
    pub fn step(
        &mut self,
        context: &Context,
        patch: &Patch,
        modulation: &Modulation,
        out: &mut [i32; CONTROL_RATE],
    ) {
        for sample in out.iter_mut() {
            self.feedback.step(patch.feedback);
            for i in (0..OPERATORS).rev() {
                let node = self.nodes[i];
                let input = OpInput {
                    sum: self.resolve(node.sum),
                    modulation: self.resolve(node.modulation),
                    pitch: modulation.pitch,
                    lfo: modulation.lfo,
                    expression: modulation.expression,
                    sustain: modulation.sustain,
                };
                let feedback = if self.feedback_source == Some(i) {
                    Some(&mut self.feedback)
                } else {
                    None
                };
                self.outputs[i] = self.ops[i].step(context, &patch.ops[i], input, feedback);
            }
            *sample = self.outputs[0];
        }
    }

    /// Report each operator's envelope state
    pub fn status(&self) -> [EnvStatus; OPERATORS] {
        core::array::from_fn(|i| self.ops[i].status())
    }
}
