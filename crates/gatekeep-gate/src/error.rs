//! Error types for the gate layer.

use gatekeep_session::SessionError;
use gatekeep_token::EnvelopeError;

/// Errors from gate operations that must *do* something (logout,
/// heartbeat shutdown). Checkpoint failures are [`GateOutcome`]s, not
/// errors.
///
/// [`GateOutcome`]: crate::GateOutcome
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The presented token failed its integrity checks.
    #[error("invalid token: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The session manager failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The heartbeat task panicked or was aborted.
    #[error("heartbeat task failed: {0}")]
    Heartbeat(String),
}
