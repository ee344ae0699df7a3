//! Error types for the core library.
//!
//! Configuration and precondition violations are reported through
//! [`CoreError`]; numerical solve outcomes are reported through
//! [`crate::solution::QpStatus`] and are never mapped into errors.

use thiserror::Error;

use crate::backend::BackendId;

/// Errors raised by the backend protocol before or around a solve.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Problem data fails validation against its dimension summary.
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    /// Incompatible option combination or unsupported backend pairing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An options value of the wrong variant was passed to a backend.
    #[error("options mismatch: expected {expected} options, got {got}")]
    OptionsMismatch {
        /// Variant the backend expected.
        expected: &'static str,
        /// Variant it received.
        got: &'static str,
    },

    /// A memory handle of the wrong variant was passed to a backend.
    #[error("memory mismatch: expected {expected} memory, got {got}")]
    MemoryMismatch {
        /// Variant the backend expected.
        expected: &'static str,
        /// Variant it received.
        got: &'static str,
    },

    /// The caller-provided buffer is smaller than the reported size.
    #[error("arena exhausted: requested {requested} words with {remaining} remaining")]
    ArenaExhausted {
        /// Words requested by the current carve.
        requested: usize,
        /// Words left in the arena.
        remaining: usize,
    },

    /// The requested backend is not present in the registry.
    #[error("backend {0:?} is not registered")]
    UnknownBackend(BackendId),

    /// A buffer or container has the wrong length for the given dims.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
