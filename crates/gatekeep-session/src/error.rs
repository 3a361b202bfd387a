//! Error types for the session layer.

use gatekeep_store::StoreError;

use crate::InvalidReason;

/// Errors from lifecycle operations.
///
/// `validate` never returns these: it reports every failure as an
/// [`InvalidReason`]. Operations that must *do* something (create,
/// extend, delete, sweep) report failures here.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The store failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session the operation targets is no longer valid.
    #[error("session is no longer valid: {0}")]
    Invalid(InvalidReason),

    /// A session lifetime of zero was requested.
    #[error("session ttl must be greater than zero")]
    ZeroTtl,
}

impl SessionError {
    /// The reason to report to the client, if this error ends the session.
    pub fn invalid_reason(&self) -> InvalidReason {
        match self {
            Self::Invalid(reason) => *reason,
            Self::Store(_) => InvalidReason::StoreUnavailable,
            Self::ZeroTtl => InvalidReason::NotFound,
        }
    }
}
