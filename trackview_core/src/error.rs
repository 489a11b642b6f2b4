//! Error types for the TrackView engines.

use thiserror::Error;
use trackview_env::StoreError;

/// Errors that can occur during graph queries, lineage fetches and selection.
#[derive(Debug, Clone, Error)]
pub enum TrackError {
    /// Row, point or track id outside the dataset (caller error, never retried)
    #[error("{what} {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: u64,
        len: u64,
    },

    /// Relation arrays disagree with each other (data-integrity error)
    #[error("Inconsistent relation {relation}: {reason}")]
    InconsistentRelation { relation: String, reason: String },

    /// Selection attempted with a camera that is neither perspective nor orthographic
    #[error("Unsupported camera type: {0}")]
    UnsupportedCameraType(String),

    /// Store read failed in a way that may succeed if retried
    #[error("Transient fetch failure: {0}")]
    TransientFetchFailure(StoreError),

    /// Store failure that retrying will not fix (missing array, corrupt metadata)
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Invalid viewer or dataset configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrackError {
    /// Creates an inconsistent-relation error.
    pub fn inconsistent(relation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InconsistentRelation {
            relation: relation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failed operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetchFailure(_))
    }
}

impl From<StoreError> for TrackError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::TransientFetchFailure(err)
        } else {
            Self::Store(err)
        }
    }
}
