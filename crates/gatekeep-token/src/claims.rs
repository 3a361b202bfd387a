//! The token payload.
//!
//! Claims are a fixed struct with a version number. Unknown fields are a
//! decoding error, so an envelope signed by a newer (or forged) issuer
//! cannot smuggle in data this build would silently ignore.

use gatekeep_store::{Role, SessionId, UserId, UserRecord, VerificationStatus};
use serde::{Deserialize, Serialize};

/// The only claims layout this build issues and accepts.
pub const CLAIMS_VERSION: u8 = 1;

/// The denormalized account state cached in a token.
///
/// Both fields are optional so a token can be issued before the account
/// lookup completes (right after login, for instance).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSnapshot {
    pub role: Option<Role>,
    pub verification: Option<VerificationStatus>,
}

impl ClaimSnapshot {
    /// Snapshot of a live account record.
    pub fn of(user: &UserRecord) -> Self {
        Self {
            role: Some(user.role),
            verification: Some(user.verification),
        }
    }

    /// `true` when the snapshot no longer describes `user`.
    pub fn differs_from(&self, user: &UserRecord) -> bool {
        *self != Self::of(user)
    }
}

/// The signed payload of a client-held token.
///
/// Field names are shortened on the wire to keep cookies small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    #[serde(rename = "v")]
    pub version: u8,
    #[serde(rename = "sid")]
    pub session_id: SessionId,
    #[serde(rename = "uid")]
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "vs", default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationStatus>,
    /// Envelope issue time, unix seconds.
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Envelope expiry, unix seconds. Bounds the token, not the session.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl TokenClaims {
    /// The cached account state.
    pub fn snapshot(&self) -> ClaimSnapshot {
        ClaimSnapshot {
            role: self.role,
            verification: self.verification,
        }
    }
}
