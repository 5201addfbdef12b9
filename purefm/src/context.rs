//! This module provides objects to reason about the processing context: the
//! sample rate and the lookup tables derived from it, plus the small set of
//! performance controllers shared by every voice.

use crate::tables::Tables;
use crate::{Error, Result};

/// The lowest sample rate supported
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// The highest sample rate supported
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// A processing context.  This owns the (large) lookup tables, which are built
/// once for a given sample rate and are read-only afterwards.  Every device
/// takes a shared reference to the context on each call rather than holding
/// onto it.
#[derive(Clone)]
pub struct Context {
    sample_rate: u32,
    tables: Box<Tables>,
}

impl Context {
    /// Create a new context for `sample_rate` (in Hz), building the tables.
    ///
    /// This allocates and performs floating point math, so it must not be
    /// called from the audio thread.
    pub fn new(sample_rate: u32) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            log::warn!("Rejecting sample rate {}", sample_rate);
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }
        log::debug!("Building tables for {} Hz", sample_rate);
        Ok(Self {
            sample_rate,
            tables: Tables::new(f64::from(sample_rate)),
        })
    }
    /// Returns the sample rate, in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// The lookup tables for this sample rate
    pub fn tables(&self) -> &Tables {
        &self.tables
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

/// Performance controller state shared by all voices.  Owned by the engine and
/// passed by value into the voices on every sample.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Controllers {
    /// Pitch bend in pitch units before the envelope's bend scaling, in the
    /// range `[-0x8000, 0x8000)`
    pub pitch_bend: i32,
    /// The smoothed expression (mod wheel/expression pedal) value, `[0, 0xfe0]`
    pub expression: i32,
    /// True while the sustain pedal is held
    pub sustain: bool,
}
