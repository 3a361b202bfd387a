//! Checkpoints and their decisions.
//!
//! Every checkpoint first gets a [`VerifiedSession`]: a token that
//! decoded cleanly plus a session the manager just validated. What each
//! checkpoint adds on top is a pure function of that session and the
//! request context, so it can be tested without a store.

use std::fmt;

use gatekeep_session::InvalidReason;
use gatekeep_store::{Session, UserId, UserRecord, VerificationStatus};
use gatekeep_token::TokenClaims;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// A named point in the request/page lifecycle where the session is
/// checked. Variants are listed in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    /// Before any handler executes.
    Edge,
    /// At the first authoritative data fetch for a protected view.
    InitialRender,
    /// Once client-side state is available.
    PostLoad,
    /// Periodically while a protected view stays open.
    Heartbeat,
}

impl Checkpoint {
    /// Every checkpoint, in lifecycle order.
    pub const ALL: [Checkpoint; 4] = [
        Checkpoint::Edge,
        Checkpoint::InitialRender,
        Checkpoint::PostLoad,
        Checkpoint::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::InitialRender => "initial_render",
            Self::PostLoad => "post_load",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Whether passing this checkpoint counts as user activity.
    ///
    /// The heartbeat fires on a timer whether or not anyone is at the
    /// keyboard, so it must not keep an idle session alive.
    pub fn records_activity(&self) -> bool {
        !matches!(self, Self::Heartbeat)
    }

    /// The checkpoint-specific decision over an already validated session.
    ///
    /// | Checkpoint | Rejects with |
    /// |---|---|
    /// | all | `IdentityMismatch` if the token names a different user than the record |
    /// | `InitialRender` | `StateChanged` if the live verification status differs from the view's requirement |
    /// | `PostLoad` | `IdentityMismatch` if the client-held identity is missing or differs |
    pub fn inspect(
        &self,
        verified: &VerifiedSession,
        ctx: &RequestContext,
    ) -> Result<(), GateReason> {
        if verified.claims.user_id != verified.session.user_id {
            return Err(GateReason::IdentityMismatch);
        }

        match self {
            Self::Edge | Self::Heartbeat => Ok(()),
            Self::InitialRender => match ctx.required_verification {
                Some(required) if verified.user.verification != required => {
                    Err(GateReason::StateChanged)
                }
                _ => Ok(()),
            },
            Self::PostLoad => match ctx.client_user_id {
                Some(client) if client == verified.user.id => Ok(()),
                _ => Err(GateReason::IdentityMismatch),
            },
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateReason
// ---------------------------------------------------------------------------

/// Why a checkpoint ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// No token was presented.
    MissingToken,
    /// The token decoded, or the session validated, negatively.
    Session(InvalidReason),
    /// The identities asserted by server, token, and client disagree.
    IdentityMismatch,
    /// The account changed so that this view no longer applies.
    StateChanged,
}

impl GateReason {
    /// Stable code for redirects and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::Session(reason) => reason.as_str(),
            Self::IdentityMismatch => "identity_mismatch",
            Self::StateChanged => "state_changed",
        }
    }

    /// Human-readable explanation for the login page.
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingToken => "Please sign in to continue.",
            Self::Session(reason) => reason.message(),
            Self::IdentityMismatch => {
                "Your sign-in could not be verified. Please sign in again."
            }
            Self::StateChanged => {
                "Your account was updated. Please sign in again."
            }
        }
    }
}

impl From<InvalidReason> for GateReason {
    fn from(reason: InvalidReason) -> Self {
        Self::Session(reason)
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => f.write_str("missing token"),
            Self::Session(reason) => reason.fmt(f),
            Self::IdentityMismatch => f.write_str("identity mismatch"),
            Self::StateChanged => f.write_str("state changed"),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestContext / VerifiedSession
// ---------------------------------------------------------------------------

/// What the caller knows about the request at a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The presented token. When `None`, the credential jar is asked.
    pub token: Option<String>,
    /// The identity the client-side state believes it belongs to.
    pub client_user_id: Option<UserId>,
    /// The verification status the requested view is for. A vendor page
    /// for pending accounts sets `Some(Pending)`.
    pub required_verification: Option<VerificationStatus>,
}

impl RequestContext {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn client_user(mut self, id: UserId) -> Self {
        self.client_user_id = Some(id);
        self
    }

    pub fn requires(mut self, status: VerificationStatus) -> Self {
        self.required_verification = Some(status);
        self
    }
}

/// A session that passed token decoding and manager validation.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub session: Session,
    pub user: UserRecord,
    pub claims: TokenClaims,
}
