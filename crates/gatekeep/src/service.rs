//! `SessionService` builder and the inbound API.
//!
//! This is the entry point for host applications. It ties together all
//! the layers: store → session manager → credential bridge → request gate.

use std::sync::Arc;
use std::time::Duration;

use gatekeep_gate::{
    Checkpoint, CookieJar, CredentialJar, GateConfig, GateOutcome, GateReason,
    Heartbeat, RequestContext, RequestGate,
};
use gatekeep_session::{SessionConfig, SessionManager};
use gatekeep_store::{
    Clock, Session, SessionMetadata, SessionRepository, SystemClock, UserId,
    UserRecord, UserRepository,
};
use gatekeep_token::{
    ClaimSnapshot, CredentialBridge, SigningKey, TokenConfig, TokenError,
};
use tokio::sync::{broadcast, oneshot};

use crate::sweeper::{self, SweepConfig, SweeperHandle};
use crate::{GatekeepError, LogoutEvent};

/// A freshly created or extended session and the token for its client.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub token: String,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`SessionService`].
///
/// # Example
///
/// ```rust
/// use gatekeep::prelude::*;
///
/// let service = SessionService::builder()
///     .signing_key(SigningKey::from_bytes(vec![42u8; 32]).unwrap())
///     .build(MemorySessionStore::new(), MemoryUserStore::new());
/// assert_eq!(service.config().max_sessions_per_user, 5);
/// ```
pub struct SessionServiceBuilder {
    session: SessionConfig,
    token: TokenConfig,
    gate: GateConfig,
    sweep: SweepConfig,
    key: Option<SigningKey>,
    clock: Option<Arc<dyn Clock>>,
    logout_capacity: usize,
}

impl SessionServiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            session: SessionConfig::default(),
            token: TokenConfig::default(),
            gate: GateConfig::default(),
            sweep: SweepConfig::default(),
            key: None,
            clock: None,
            logout_capacity: 256,
        }
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn token_config(mut self, config: TokenConfig) -> Self {
        self.token = config;
        self
    }

    pub fn gate_config(mut self, config: GateConfig) -> Self {
        self.gate = config;
        self
    }

    pub fn sweep_config(mut self, config: SweepConfig) -> Self {
        self.sweep = config;
        self
    }

    /// Sets the token signing key. Without one, a random key is
    /// generated and tokens stop verifying after a restart.
    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Replaces the system clock (tests use `ManualClock`).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Buffer size of the forced-logout channel. Slow subscribers that
    /// fall further behind miss events.
    pub fn logout_capacity(mut self, capacity: usize) -> Self {
        self.logout_capacity = capacity.max(1);
        self
    }

    /// Assembles the service over the given repositories.
    pub fn build<S, U>(self, store: S, users: U) -> SessionService<S, U>
    where
        S: SessionRepository,
        U: UserRepository,
    {
        let session = self.session.validated();
        let mut token = self.token;
        if token.token_ttl > session.absolute_timeout {
            tracing::warn!(
                token_ttl = ?token.token_ttl,
                absolute_timeout = ?session.absolute_timeout,
                "token_ttl exceeds absolute session timeout, clamping"
            );
            token.token_ttl = session.absolute_timeout;
        }
        let key = self.key.unwrap_or_else(|| {
            tracing::warn!("no signing key configured, generating an ephemeral one");
            SigningKey::generate()
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let manager =
            SessionManager::with_clock(store, users, session, Arc::clone(&clock));
        let bridge = Arc::new(CredentialBridge::with_clock(key, token, clock));
        let gate = RequestGate::new(manager, bridge, self.gate);
        let (logouts, _) = broadcast::channel(self.logout_capacity);

        SessionService {
            gate,
            logouts,
            sweep: self.sweep,
        }
    }
}

impl Default for SessionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Session lifecycle and request validation for a host application.
///
/// Cheap to clone; clones share the same manager, bridge, and logout
/// channel.
pub struct SessionService<S, U> {
    gate: RequestGate<S, U>,
    logouts: broadcast::Sender<LogoutEvent>,
    sweep: SweepConfig,
}

impl<S, U> Clone for SessionService<S, U> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            logouts: self.logouts.clone(),
            sweep: self.sweep.clone(),
        }
    }
}

impl SessionService<(), ()> {
    /// Creates a new builder.
    pub fn builder() -> SessionServiceBuilder {
        SessionServiceBuilder::new()
    }
}

impl<S, U> SessionService<S, U>
where
    S: SessionRepository,
    U: UserRepository,
{
    pub fn config(&self) -> &SessionConfig {
        self.sessions().config()
    }

    /// The request gate, for running checkpoints directly.
    pub fn gate(&self) -> &RequestGate<S, U> {
        &self.gate
    }

    /// The session manager.
    pub fn sessions(&self) -> &SessionManager<S, U> {
        self.gate.sessions()
    }

    pub async fn open(&self) -> Result<(), GatekeepError> {
        Ok(self.sessions().open().await?)
    }

    pub async fn close(&self) -> Result<(), GatekeepError> {
        Ok(self.sessions().close().await?)
    }

    // -----------------------------------------------------------------
    // Inbound operations
    // -----------------------------------------------------------------

    /// Creates a session after a successful login and issues its token.
    pub async fn create_session(
        &self,
        user_id: UserId,
        ttl: Duration,
        metadata: SessionMetadata,
    ) -> Result<IssuedSession, GatekeepError> {
        let session = self.sessions().create(user_id, ttl, metadata).await?;
        // The first checkpoint re-issues with real claims.
        let snapshot = self
            .live_user(user_id)
            .await
            .map(|user| ClaimSnapshot::of(&user))
            .unwrap_or_default();
        let token = self.gate.bridge().issue(&session, snapshot)?;
        Ok(IssuedSession { session, token })
    }

    /// Checks a token at the edge.
    ///
    /// A dead or rejected record is already deleted on failure; the
    /// caller clears the client's cookies (or use [`check`](Self::check)
    /// with a jar).
    pub async fn validate_session(&self, token: &str) -> GateOutcome {
        let mut jar = CookieJar::with_token(self.gate.config(), token);
        self.gate
            .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
            .await
    }

    /// Runs a checkpoint against a request's credential jar.
    pub async fn check<J: CredentialJar>(
        &self,
        checkpoint: Checkpoint,
        ctx: &RequestContext,
        jar: &mut J,
    ) -> GateOutcome {
        self.gate.check(checkpoint, ctx, jar).await
    }

    /// Extends the session behind `token` by `ttl` and issues a token
    /// covering the new lifetime.
    ///
    /// # Errors
    /// - [`GatekeepError::Token`] if the token fails its integrity checks
    /// - [`GatekeepError::Session`] if the session is no longer valid
    pub async fn extend_session(
        &self,
        token: &str,
        ttl: Duration,
    ) -> Result<IssuedSession, GatekeepError> {
        let decoded = self.gate.bridge().decode(token).map_err(TokenError::from)?;
        let session = self.sessions().extend(decoded.session_id(), ttl).await?;
        let bridge = self.gate.bridge();
        let token = match self.live_user(session.user_id).await {
            Some(user) => bridge.refresh(&session, &user)?,
            None => bridge.issue(&session, decoded.claims.snapshot())?,
        };
        Ok(IssuedSession { session, token })
    }

    /// Deletes the session behind `token`. Returns `true` if this call
    /// removed it.
    pub async fn delete_session(&self, token: &str) -> Result<bool, GatekeepError> {
        let decoded = self.gate.bridge().decode(token).map_err(TokenError::from)?;
        Ok(self.sessions().delete(decoded.session_id()).await?)
    }

    pub async fn delete_all_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<u64, GatekeepError> {
        Ok(self.sessions().delete_all_for_user(user_id).await?)
    }

    /// A user's stored sessions, oldest first.
    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, GatekeepError> {
        Ok(self.sessions().list_for_user(user_id).await?)
    }

    pub async fn sweep_expired(&self) -> Result<u64, GatekeepError> {
        Ok(self.sessions().sweep_expired().await?)
    }

    pub async fn sweep_idle(&self) -> Result<u64, GatekeepError> {
        Ok(self.sessions().sweep_idle().await?)
    }

    /// Approximate number of users currently online.
    pub async fn active_session_count(&self) -> Result<u64, GatekeepError> {
        Ok(self.sessions().active_count().await?)
    }

    // -----------------------------------------------------------------
    // Forced logout
    // -----------------------------------------------------------------

    /// Deletes every session of `user_id` and publishes a
    /// [`LogoutEvent`] to subscribers.
    ///
    /// Used for deactivation, password changes, and security incidents.
    /// The event is published only after the records are gone.
    pub async fn force_logout(
        &self,
        user_id: UserId,
        reason: impl Into<String>,
    ) -> Result<LogoutEvent, GatekeepError> {
        let reason = reason.into();
        let sessions_removed = self.sessions().delete_all_for_user(user_id).await?;
        let event = LogoutEvent {
            user_id,
            reason,
            sessions_removed,
            at: self.sessions().now(),
        };
        // No subscribers is fine: the records are gone either way.
        let delivered = self.logouts.send(event.clone()).unwrap_or(0);
        tracing::warn!(
            %user_id,
            reason = %event.reason,
            sessions_removed,
            delivered,
            "forced logout"
        );
        Ok(event)
    }

    /// Subscribes to forced-logout events.
    pub fn subscribe_logouts(&self) -> broadcast::Receiver<LogoutEvent> {
        self.logouts.subscribe()
    }

    // -----------------------------------------------------------------
    // Background tasks
    // -----------------------------------------------------------------

    /// Starts the periodic sweeper.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        sweeper::spawn(self.sessions().clone(), &self.sweep)
    }

    /// Starts a heartbeat for an open protected view.
    pub fn spawn_heartbeat<J>(
        &self,
        ctx: RequestContext,
        jar: J,
    ) -> (Heartbeat<J>, oneshot::Receiver<GateReason>)
    where
        J: CredentialJar + Send + 'static,
    {
        Heartbeat::spawn(self.gate.clone(), ctx, jar)
    }

    /// The user's current record, or `None` if the lookup fails or stalls
    /// past `store_timeout`.
    async fn live_user(&self, user_id: UserId) -> Option<UserRecord> {
        let lookup = self.sessions().users().find_active_user_by_id(user_id);
        match tokio::time::timeout(self.config().store_timeout, lookup).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                tracing::debug!(%user_id, error = %e, "user lookup failed");
                None
            }
            Err(_) => {
                tracing::debug!(%user_id, "user lookup timed out");
                None
            }
        }
    }
}
