//! Unified error type for Gatekeep.

use gatekeep_gate::GateError;
use gatekeep_session::SessionError;
use gatekeep_store::StoreError;
use gatekeep_token::TokenError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `gatekeep` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. `#[from]` on
/// each variant lets `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatekeepError {
    /// The session store failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lifecycle operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Issuing or decoding a token failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A gate operation failed.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}
