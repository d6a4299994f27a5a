//! Error types for the adaptivemap library.
//!
//! Normal operation has no recoverable errors: absence is reported through
//! `Option`, never `Err`. The one error type here backs the diagnostic
//! [`AdaptiveMap::check_invariants`](crate::map::AdaptiveMap::check_invariants)
//! method used by tests and debug assertions.

use std::fmt;

/// Error returned when internal map invariants are violated.
///
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}
