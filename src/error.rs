//! Crate-wide error type.
//!
//! Absence is not an error anywhere in this crate: a read that finds no
//! value returns `None` (or an empty collection) and callers branch on it.
//! The variants below cover the cases that genuinely abort an operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Constructor rejected its configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The argv entry point was called with the wrong arity.
    #[error("Invalid number of arguments.")]
    InvalidArguments,

    /// The argv seed did not parse as a decimal number.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// A neighbor's item count vanished mid similarity update. The pair
    /// count has already been written when this fires, so the similarity
    /// stores may briefly disagree until the next interaction repairs them.
    #[error("missing item count for item {item}")]
    MissingItemCount { item: String },
}

pub type Result<T> = std::result::Result<T, Error>;
