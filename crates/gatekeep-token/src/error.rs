//! Error types for the token layer.

/// Why a presented token was refused before any store lookup.
///
/// Every variant maps to the same client-facing outcome (envelope
/// invalid). The distinction exists for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Wrong number of segments, bad base64, or non-UTF-8 payload.
    #[error("malformed envelope: {0}")]
    Malformed(&'static str),

    /// The MAC does not match the payload.
    #[error("signature mismatch")]
    Signature,

    /// The payload verified but is not a valid claims object.
    #[error("invalid claims: {0}")]
    Claims(String),

    /// The claims layout version is not one this build understands.
    #[error("unsupported claims version {0}")]
    Version(u8),

    /// The envelope's own lifetime is over.
    #[error("envelope expired")]
    Expired,
}

/// Errors from issuing tokens or building a bridge.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The signing key is shorter than [`SigningKey::MIN_LEN`](crate::SigningKey::MIN_LEN).
    #[error("signing key must be at least {min} bytes, got {got}")]
    KeyTooShort { min: usize, got: usize },

    /// Claims could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session expires before a token could usefully live.
    #[error("session expires before a token could be issued")]
    SessionExpired,

    /// A presented token failed its integrity checks.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}
