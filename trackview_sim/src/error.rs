//! Error types for simulation runs.

use thiserror::Error;
use trackview_core::TrackError;
use trackview_env::StoreError;

/// Errors that abort a scenario.
#[derive(Debug, Error)]
pub enum SimError {
    /// The viewer core returned an error the scenario did not expect
    #[error("track error: {0}")]
    Track(#[from] TrackError),

    /// Building the synthetic store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The async runtime could not be started
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// An observed value disagrees with ground truth
    #[error("check failed: {0}")]
    Check(String),
}

/// Fails with `SimError::Check` unless `condition` holds.
pub fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), SimError> {
    if condition {
        Ok(())
    } else {
        Err(SimError::Check(message()))
    }
}
