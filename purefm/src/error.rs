//! Errors reported on the control side.  The real-time path never fails: it
//! degrades to silence or clamps instead.

use thiserror::Error;

/// Errors produced when configuring the engine or validating a patch before
/// publishing it
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The sample rate is outside of the range the tables can represent
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),
    /// An operator's sum or modulation input refers to an operator that
    /// does not exist
    #[error("operator {op} is wired to nonexistent operator {input}")]
    InvalidWiring {
        /// The operator being wired
        op: usize,
        /// The requested input index
        input: usize,
    },
    /// A sum input that loops back to the same or an earlier operator.  Only
    /// modulation inputs may form feedback loops.
    #[error("operator {op} sums from operator {input}, which is not computed first")]
    SumLoop {
        /// The operator being wired
        op: usize,
        /// The requested sum input
        input: usize,
    },
    /// The key-up stage does not exist in the envelope
    #[error("key up stage {index} is out of range for {stages} stages")]
    InvalidKeyUp {
        /// Requested key up stage
        index: usize,
        /// Number of stages in the envelope
        stages: usize,
    },
}

/// Result type for fallible control-side operations
pub type Result<T> = core::result::Result<T, Error>;
