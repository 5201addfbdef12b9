//! Read-only snapshots of engine state for display.  These are copied out of
//! the engine on request; nothing written to them affects synthesis.

use crate::OPERATORS;

/// The state of one envelope
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvStatus {
    /// The stage being run, or `None` if the envelope is stopped
    pub stage: Option<usize>,
    /// The current output, in the upper 16 bits of the envelope range
    pub output: i32,
}

/// The state of one voice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceStatus {
    /// The last key started on this voice, if any
    pub key: Option<u8>,
    /// True if the key is held (its last start had nonzero velocity)
    pub triggered: bool,
    /// The smoothed pressure (aftertouch) value
    pub pressure: i32,
    /// The pitch envelope
    pub pitch: EnvStatus,
    /// The LFO envelope
    pub lfo: EnvStatus,
    /// Each operator's envelope
    pub ops: [EnvStatus; OPERATORS],
}
