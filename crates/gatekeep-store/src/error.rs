//! Error types for the store layer.

use std::time::Duration;

/// Errors a session or user repository can report.
///
/// "Record not found" is deliberately NOT an error here: lookups return
/// `Ok(None)` and deletes return `Ok(false)`. Concurrent logouts, sweeps,
/// and validations race against the same records all the time, and an
/// already-gone record is a normal outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The repository has been closed (or was never opened).
    #[error("session store is closed")]
    Closed,

    /// The operation did not complete within the caller's deadline.
    #[error("session store timed out after {0:?}")]
    Timeout(Duration),

    /// The backing database rejected the call or could not be reached.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A session with this identifier already exists.
    #[error("session id already exists")]
    Duplicate,
}

impl StoreError {
    /// Returns `true` for failures that indicate an infrastructure problem
    /// rather than a caller mistake.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}
