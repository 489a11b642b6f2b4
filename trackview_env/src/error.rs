//! Error types for the TrackView store abstraction.

use std::ops::Range;
use thiserror::Error;

/// Errors that can occur while reading from a chunked array store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No array exists at the requested path
    #[error("Array not found: {0}")]
    NotFound(String),

    /// Requested element range falls outside the array
    #[error("Range {range:?} out of bounds for {path} (len {len})")]
    OutOfBounds {
        path: String,
        range: Range<u64>,
        len: u64,
    },

    /// Array element type cannot be read as the requested type
    #[error("Type mismatch for {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },

    /// Network or I/O failure; the same read may succeed if retried
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Metadata or chunk bytes could not be interpreted
    #[error("Corrupt array {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl StoreError {
    /// Creates a transient error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates a corrupt-array error.
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the same read could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Validates that `range` is a well-formed slice of an array of `len` elements.
pub(crate) fn check_range(path: &str, range: &Range<u64>, len: u64) -> Result<(), StoreError> {
    if range.start > range.end || range.end > len {
        return Err(StoreError::OutOfBounds {
            path: path.to_string(),
            range: range.clone(),
            len,
        });
    }
    Ok(())
}
