//! This crate contains all of the DSP logic for the PureFM synthesizer: a
//! polyphonic, 8-operator FM engine rendered one sample at a time using only
//! integer math once the lookup tables have been built.
//!
//! All signal values share a common 24 bit signed scale.  Envelope outputs and
//! operator levels live in `[EG_MIN, EG_MAX]` and are interpreted in the log
//! domain; conversion to a linear audio sample happens exactly once per
//! operator per sample via [tables::Tables::output].  Pitches are expressed in
//! "pitch units" of 4096 per octave, where zero is middle C.
//!
//! Most users will only need the [Engine], a [Context] and a [patch::Patch]
//! delivered through the [handoff] channel.  The individual components are
//! exposed in [devices] and [voice] for testing and for hosts that want to
//! compose them differently.
//!
//! Nothing reachable from [Engine::step], [Engine::midi], [Engine::update] or
//! [Engine::sync] allocates, blocks, or logs.

#![warn(missing_docs)]

pub mod context;
pub mod devices;
pub mod engine;
mod error;
pub mod handoff;
pub mod patch;
pub mod status;
pub mod tables;
pub mod voice;

pub use context::{Context, Controllers};
pub use engine::{Engine, EngineConfig, VoiceAllocation};
pub use error::{Error, Result};
pub use handoff::{patch_channel, PatchPublisher, PatchReceiver};
pub use patch::Patch;

/// The lowest envelope/level value.  An envelope at this level is silent.
pub const EG_MIN: i32 = -0x80_0000;
/// The highest envelope/level value.
pub const EG_MAX: i32 = 0x7f_ffff;
/// Number of samples between control-rate updates (LFO, pitch, glide).  This is
/// also the size of each voice's lookahead buffer.
pub const CONTROL_RATE: usize = 16;
/// Number of operators in an algorithm
pub const OPERATORS: usize = 8;
/// Number of voices in the engine's pool
pub const POLYPHONY: usize = 16;
/// Maximum number of stages in a single envelope
pub const MAX_STAGES: usize = 16;

/// A mixed output sample as a fixed point number: the engine's internal scale
/// places full scale for a single voice at `2^23`, and the mix of all voices is
/// normalized by `2^28` (4 integral bits of headroom for 16 voices).
pub type SampleFxP = fixed::types::I4F28;
