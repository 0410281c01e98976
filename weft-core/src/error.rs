//! Crate error type.
//!
//! Almost every operation in the engine is infallible: bad inputs degrade
//! to warn-only no-ops so read-oriented code paths stay crash-free. The
//! exceptions are collected here.

use thiserror::Error;

/// Errors produced by weft-core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Weak collections hold their keys by reference, so a scalar can never
    /// be a weak key.
    #[error("weak collections require a container key, got {0}")]
    InvalidWeakKey(&'static str),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
