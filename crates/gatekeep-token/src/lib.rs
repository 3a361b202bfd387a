//! Credential bridge for Gatekeep.
//!
//! Translates between the signed, stateless token a client holds and the
//! authoritative session record:
//!
//! - **Claims** ([`TokenClaims`], [`ClaimSnapshot`]): the versioned
//!   payload carried inside the token.
//! - **Codec** ([`seal`], [`open`]): the `payload.signature` envelope
//!   format, HMAC-SHA256 over the payload segment.
//! - **Bridge** ([`CredentialBridge`]): issue, decode, and the refresh
//!   policy that keeps embedded claims from going stale.
//! - **Errors** ([`TokenError`], [`EnvelopeError`]).
//!
//! # Integrity, not liveness
//!
//! A token that decodes cleanly only proves nobody tampered with it and
//! its envelope has not expired. Whether the session behind it is still
//! alive is always answered by the session manager.
//!
//! ```text
//! Request Gate (above)   ← decode first, then validate the session id
//!     ↕
//! Token Layer (this crate)
//!     ↕
//! Store Layer (below)    ← SessionId, UserId, Role, VerificationStatus
//! ```

mod bridge;
mod claims;
mod codec;
mod error;
mod key;

pub use bridge::{CredentialBridge, DecodedToken, TokenConfig};
pub use claims::{CLAIMS_VERSION, ClaimSnapshot, TokenClaims};
pub use codec::{open, seal};
pub use error::{EnvelopeError, TokenError};
pub use key::SigningKey;
