//! Issuing, decoding, and refreshing client-held tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use gatekeep_store::{Clock, Session, SessionId, SystemClock, UserRecord};
use serde::{Deserialize, Serialize};

use crate::{
    CLAIMS_VERSION, ClaimSnapshot, EnvelopeError, SigningKey, TokenClaims,
    TokenError, open, seal,
};

// ---------------------------------------------------------------------------
// TokenConfig
// ---------------------------------------------------------------------------

/// Token envelope settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Longest an envelope may live. Capped further by the session's own
    /// expiry at issue time.
    pub token_ttl: Duration,

    /// Envelope age after which a validated request gets a re-issued
    /// token with fresh claims. Matches the activity throttle.
    pub refresh_interval: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl TokenConfig {
    /// Envelope timestamps have one-second resolution.
    pub const MIN_TTL: Duration = Duration::from_secs(1);

    /// Clamps out-of-range values, logging each correction.
    pub fn validated(mut self) -> Self {
        if self.token_ttl < Self::MIN_TTL {
            tracing::warn!(
                token_ttl = ?self.token_ttl,
                "token_ttl below one second, using default"
            );
            self.token_ttl = Self::default().token_ttl;
        }
        if self.refresh_interval.is_zero() {
            tracing::warn!("refresh_interval is zero, using default");
            self.refresh_interval = Self::default().refresh_interval;
        }
        if self.refresh_interval > self.token_ttl {
            tracing::warn!(
                refresh_interval = ?self.refresh_interval,
                token_ttl = ?self.token_ttl,
                "refresh_interval exceeds token_ttl, clamping"
            );
            self.refresh_interval = self.token_ttl;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// DecodedToken
// ---------------------------------------------------------------------------

/// A token that passed every integrity check.
///
/// Says nothing about whether the session is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub claims: TokenClaims,
}

impl DecodedToken {
    pub fn session_id(&self) -> &SessionId {
        &self.claims.session_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        from_unix(self.claims.issued_at)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        from_unix(self.claims.expires_at)
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ---------------------------------------------------------------------------
// CredentialBridge
// ---------------------------------------------------------------------------

/// Issues and verifies client-held tokens.
///
/// ## Example
///
/// ```rust
/// use gatekeep_token::{ClaimSnapshot, CredentialBridge, SigningKey, TokenConfig};
/// # use gatekeep_store::{Session, SessionId, SessionMetadata, UserId};
/// # let now = chrono::Utc::now();
/// # let session = Session {
/// #     id: SessionId::generate(),
/// #     user_id: UserId(1),
/// #     created_at: now,
/// #     last_activity: now,
/// #     expires_at: now + chrono::Duration::hours(1),
/// #     metadata: SessionMetadata::default(),
/// # };
///
/// let bridge = CredentialBridge::new(SigningKey::generate(), TokenConfig::default());
/// let token = bridge.issue(&session, ClaimSnapshot::default()).unwrap();
///
/// let decoded = bridge.decode(&token).unwrap();
/// assert_eq!(decoded.session_id(), &session.id);
/// ```
pub struct CredentialBridge {
    key: SigningKey,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CredentialBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBridge")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CredentialBridge {
    /// Creates a bridge using the system clock.
    pub fn new(key: SigningKey, config: TokenConfig) -> Self {
        Self::with_clock(key, config, Arc::new(SystemClock))
    }

    /// Creates a bridge with an explicit clock.
    pub fn with_clock(
        key: SigningKey,
        config: TokenConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key,
            config: config.validated(),
            clock,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Signs a token for `session` carrying `snapshot`.
    ///
    /// The envelope lives for `min(token_ttl, session.expires_at - now)`,
    /// rounded down to whole seconds.
    ///
    /// # Errors
    /// - [`TokenError::SessionExpired`] if less than a second of session
    ///   lifetime remains
    /// - [`TokenError::Encode`] if the claims can't be serialized
    pub fn issue(
        &self,
        session: &Session,
        snapshot: ClaimSnapshot,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let remaining = (session.expires_at - now).num_seconds();
        let ttl = i64::try_from(self.config.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let lifetime = ttl.min(remaining);
        if lifetime < 1 {
            return Err(TokenError::SessionExpired);
        }

        let issued_at = now.timestamp();
        let claims = TokenClaims {
            version: CLAIMS_VERSION,
            session_id: session.id.clone(),
            user_id: session.user_id,
            role: snapshot.role,
            verification: snapshot.verification,
            issued_at,
            expires_at: issued_at.saturating_add(lifetime),
        };
        let token = seal(&self.key, &claims)?;

        tracing::debug!(
            session_id = %session.id,
            lifetime_secs = lifetime,
            "token issued"
        );
        Ok(token)
    }

    /// Verifies a token's signature, claims, and envelope expiry.
    ///
    /// Never touches a store. A clean result still needs a session
    /// validation before the request may proceed.
    pub fn decode(&self, token: &str) -> Result<DecodedToken, EnvelopeError> {
        let claims = open(&self.key, token).inspect_err(|e| {
            tracing::debug!(error = %e, "token rejected");
        })?;
        if self.clock.now().timestamp() >= claims.expires_at {
            tracing::debug!(session_id = %claims.session_id, "token envelope expired");
            return Err(EnvelopeError::Expired);
        }
        Ok(DecodedToken { claims })
    }

    /// Whether a validated request should receive a re-issued token:
    /// the envelope is at least `refresh_interval` old, or its cached
    /// claims no longer match the live account.
    pub fn refresh_due(
        &self,
        claims: &TokenClaims,
        user: &UserRecord,
        now: DateTime<Utc>,
    ) -> bool {
        let age = now.timestamp().saturating_sub(claims.issued_at);
        let interval =
            i64::try_from(self.config.refresh_interval.as_secs()).unwrap_or(i64::MAX);
        age >= interval
            || claims.user_id != user.id
            || claims.snapshot().differs_from(user)
    }

    /// Re-issues a token for `session` with claims taken from `user`.
    pub fn refresh(
        &self,
        session: &Session,
        user: &UserRecord,
    ) -> Result<String, TokenError> {
        self.issue(session, ClaimSnapshot::of(user))
    }

    /// The bridge clock's current time.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
