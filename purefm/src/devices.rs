//! This module contains the DSP primitives an FM voice is built from.

use crate::context::Context;

mod env;
mod feedback;
mod lfo;
mod op;
mod osc;

/// A DSP Device
///
/// A device is a logical component that takes a set of input signals and
/// applies some logic to them, according to a set of parameters, to produce
/// an output.  The line between input and parameter is a convenience: inputs
/// change from call to call (pitch, modulation, bias), while parameters are
/// the parts of a [crate::Patch] that configure the device and are only read.
///
/// Parameters are borrowed for the duration of one call, so devices never
/// hold onto a patch and a new patch can be swapped in between any two calls.
pub trait Device {
    /// The input type for this device
    type Input;
    /// The parameter type for this device, borrowed from the patch
    type Params: ?Sized;
    /// The output type for this device
    type Output;
    /// Within the provided `context`, take one step of `input` and execute
    /// the device's logic using `params`, then return the output.
    fn next(&mut self, context: &Context, input: Self::Input, params: &Self::Params)
        -> Self::Output;
}

pub use env::{EnvInput, Envelope, Ramp};
pub use feedback::FeedbackFilter;
pub use lfo::Lfo;
pub use op::{OpInput, Operator};
pub use osc::{Noise, Oscillator, SawDown, SawUp, Sine, Square, Triangle, Wave, Waveform};
