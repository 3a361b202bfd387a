//! The session lifecycle manager: the only writer of the session store.
//!
//! It's responsible for:
//! - Creating sessions and enforcing the per-user retention bound
//! - Validating sessions (expiry, idle, absolute age, account state)
//! - Persisting activity at a throttled rate
//! - Explicit extension and idempotent deletion
//! - Bulk sweeps and the "currently online" gauge
//!
//! # Concurrency
//!
//! `SessionManager` is a cheap-to-clone handle (`Arc` inside) and every
//! method takes `&self`, so one manager is shared by every request task
//! and the background sweeper. Races are expected, not exceptional:
//!
//! - Concurrent validations of the same identifier are coalesced into one
//!   store round-trip, so a stale record is deleted once no matter how
//!   many requests discover it together.
//! - Creations for the same user are serialized, so eviction counts are
//!   exact.
//! - Deletion of an already-gone record is a successful no-op.
//!
//! Every store call is bounded by `store_timeout`. A validation that
//! times out is invalid: failing open on a liveness check would be a
//! security defect.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use gatekeep_store::{
    Clock, Session, SessionId, SessionMetadata, SessionRepository,
    StoreError, SweepPredicate, SystemClock, UserId, UserRepository,
    add_saturating, sub_saturating,
};

use crate::keyed::KeyedMutex;
use crate::{
    InvalidReason, SessionConfig, SessionError, Throttle, Validation,
    expiry_reason,
};

type SharedValidation = Shared<BoxFuture<'static, Validation>>;

/// Creates, validates, extends, and deletes sessions.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ [live] ──validate()──→ [live] (activity written ≤ once / 5 min)
///                 │                       │
///                 │ extend()              │ expired / idle / too old /
///                 ▼                       ▼ account deactivated
///              [live]                 [deleted] ←── delete(), sweep_*()
/// ```
pub struct SessionManager<S, U> {
    inner: Arc<Inner<S, U>>,
}

impl<S, U> Clone for SessionManager<S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, U> {
    store: S,
    users: U,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    activity: Throttle<SessionId>,
    validations: Mutex<HashMap<SessionId, SharedValidation>>,
    creations: KeyedMutex<UserId>,
}

impl<S, U> SessionManager<S, U>
where
    S: SessionRepository,
    U: UserRepository,
{
    /// Creates a manager using the system clock.
    pub fn new(store: S, users: U, config: SessionConfig) -> Self {
        Self::with_clock(store, users, config, Arc::new(SystemClock))
    }

    /// Creates a manager with an explicit clock (tests use `ManualClock`).
    pub fn with_clock(
        store: S,
        users: U,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.validated();
        Self {
            inner: Arc::new(Inner {
                store,
                users,
                clock,
                activity: Throttle::new(config.activity_update_interval),
                config,
                validations: Mutex::new(HashMap::new()),
                creations: KeyedMutex::new(),
            }),
        }
    }

    /// The effective (validated) configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The current time according to the manager's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// The underlying session store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The underlying user store.
    pub fn users(&self) -> &U {
        &self.inner.users
    }

    // -----------------------------------------------------------------
    // Repository lifecycle
    // -----------------------------------------------------------------

    /// Opens the session store.
    pub async fn open(&self) -> Result<(), SessionError> {
        self.inner.bounded(self.inner.store.open()).await?;
        tracing::info!("session store opened");
        Ok(())
    }

    /// Closes the session store. Later validations fail closed.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.inner.bounded(self.inner.store.close()).await?;
        tracing::info!("session store closed");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------

    /// Creates a session for `user_id` after a successful login.
    ///
    /// The new record has `created_at = last_activity = now` and
    /// `expires_at = now + ttl`. Afterwards the user's oldest sessions
    /// beyond `max_sessions_per_user` are evicted. Creations for the same
    /// user run one at a time.
    ///
    /// # Errors
    /// - [`SessionError::ZeroTtl`] if `ttl` is zero
    /// - [`SessionError::Store`] if the record could not be written
    pub async fn create(
        &self,
        user_id: UserId,
        ttl: Duration,
        metadata: SessionMetadata,
    ) -> Result<Session, SessionError> {
        if ttl.is_zero() {
            return Err(SessionError::ZeroTtl);
        }

        let _creation = self.inner.creations.lock(user_id).await;

        let now = self.inner.clock.now();
        let session = Session {
            id: SessionId::generate(),
            user_id,
            created_at: now,
            last_activity: now,
            expires_at: add_saturating(now, ttl),
            metadata,
        };

        self.inner
            .bounded(self.inner.store.insert(session.clone()))
            .await?;

        tracing::info!(
            session_id = %session.id,
            %user_id,
            expires_at = %session.expires_at,
            "session created"
        );

        if let Err(e) = self.inner.evict_excess(user_id, &session.id).await {
            // The new session is already stored. The next creation for this
            // user retries the eviction.
            tracing::warn!(%user_id, error = %e, "session eviction failed");
        }

        Ok(session)
    }

    /// Creates a session with the configured default lifetime.
    pub async fn create_default(
        &self,
        user_id: UserId,
        metadata: SessionMetadata,
    ) -> Result<Session, SessionError> {
        self.create(user_id, self.inner.config.session_ttl, metadata)
            .await
    }

    // -----------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------

    /// Validates a session on behalf of a user-initiated request.
    ///
    /// On success, if the last recorded activity is at least
    /// `activity_update_interval` old, a refreshed `last_activity` is
    /// written in a background task. That write is best-effort and is
    /// skipped while another one for the same session is in flight.
    pub async fn validate(&self, id: &SessionId) -> Validation {
        let outcome = self.check(id).await;
        if let Validation::Valid { session, .. } = &outcome {
            self.record_activity(session);
        }
        outcome
    }

    /// Validates a session without counting the call as activity.
    ///
    /// Used by background checks (the client heartbeat) that must notice
    /// a dead session but must not keep an idle one alive.
    pub async fn validate_passive(&self, id: &SessionId) -> Validation {
        self.check(id).await
    }

    /// Runs (or joins) the coalesced validation for `id`.
    ///
    /// The lookup runs on its own task, so it finishes and leaves the
    /// in-flight map even when every waiting request is dropped.
    async fn check(&self, id: &SessionId) -> Validation {
        let shared = {
            let mut inflight = self
                .inner
                .validations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match inflight.get(id) {
                Some(existing) => existing.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let key = id.clone();
                    let task = tokio::spawn(async move {
                        let outcome = inner.check_uncoalesced(&key).await;
                        inner
                            .validations
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&key);
                        outcome
                    });
                    let session_id = id.clone();
                    let fut = task
                        .map(move |joined| {
                            joined.unwrap_or_else(|e| {
                                tracing::warn!(
                                    %session_id,
                                    error = %e,
                                    "validation task failed, failing closed"
                                );
                                Validation::Invalid(InvalidReason::StoreUnavailable)
                            })
                        })
                        .boxed()
                        .shared();
                    inflight.insert(id.clone(), fut.clone());
                    fut
                }
            }
        };
        shared.await
    }

    fn record_activity(&self, session: &Session) {
        let now = self.inner.clock.now();
        let Some(guard) = self.inner.activity.begin(
            session.id.clone(),
            session.last_activity,
            now,
        ) else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        let id = session.id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match inner.bounded(inner.store.touch(&id, now)).await {
                Ok(true) => {
                    tracing::debug!(session_id = %id, "activity recorded");
                }
                Ok(false) => {
                    tracing::debug!(
                        session_id = %id,
                        "activity dropped, session already gone"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %id,
                        error = %e,
                        "activity write failed"
                    );
                }
            }
        });
    }

    // -----------------------------------------------------------------
    // Extension and deletion
    // -----------------------------------------------------------------

    /// Pushes a live session's expiry forward by `additional_ttl` and
    /// refreshes its activity. Never called implicitly.
    ///
    /// # Errors
    /// - [`SessionError::Invalid`] if the session is no longer valid
    /// - [`SessionError::Store`] if the update could not be written
    pub async fn extend(
        &self,
        id: &SessionId,
        additional_ttl: Duration,
    ) -> Result<Session, SessionError> {
        let mut session = match self.check(id).await {
            Validation::Valid { session, .. } => session,
            Validation::Invalid(reason) => {
                return Err(SessionError::Invalid(reason));
            }
        };

        let now = self.inner.clock.now();
        session.expires_at = add_saturating(session.expires_at, additional_ttl);
        session.last_activity = now;

        let updated = self.inner.bounded(self.inner.store.update(&session)).await?;
        if !updated {
            return Err(SessionError::Invalid(InvalidReason::NotFound));
        }

        tracing::info!(
            session_id = %session.id,
            expires_at = %session.expires_at,
            "session extended"
        );
        Ok(session)
    }

    /// Deletes a session. Returns `true` if this call removed it; deleting
    /// a session that is already gone is not an error.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, SessionError> {
        let removed = self.inner.bounded(self.inner.store.delete(id)).await?;
        if removed {
            tracing::info!(session_id = %id, "session deleted");
        }
        Ok(removed)
    }

    /// Deletes every session of a user (logout everywhere, deactivation,
    /// password change). Returns how many were removed.
    pub async fn delete_all_for_user(
        &self,
        user_id: UserId,
    ) -> Result<u64, SessionError> {
        let removed = self
            .inner
            .bounded(self.inner.store.delete_for_user(user_id))
            .await?;
        tracing::info!(%user_id, removed, "all sessions deleted for user");
        Ok(removed)
    }

    /// Lists a user's stored sessions, oldest first. Records are returned
    /// as stored; dead ones disappear on their next validation or sweep.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Session>, SessionError> {
        Ok(self
            .inner
            .bounded(self.inner.store.list_for_user(user_id))
            .await?)
    }

    // -----------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------

    /// Deletes every session past its expiry or its absolute age limit.
    pub async fn sweep_expired(&self) -> Result<u64, SessionError> {
        let now = self.inner.clock.now();
        let predicates = [
            SweepPredicate::ExpiresAtOrBefore(now),
            SweepPredicate::CreatedAtOrBefore(sub_saturating(
                now,
                self.inner.config.absolute_timeout,
            )),
        ];
        let removed = self
            .inner
            .bounded(self.inner.store.delete_matching(&predicates))
            .await?;
        if removed > 0 {
            tracing::info!(removed, "swept expired sessions");
        }
        Ok(removed)
    }

    /// Deletes every session idle for at least `idle_timeout`.
    pub async fn sweep_idle(&self) -> Result<u64, SessionError> {
        let now = self.inner.clock.now();
        let cutoff = sub_saturating(now, self.inner.config.idle_timeout);
        let removed = self
            .inner
            .bounded(
                self.inner
                    .store
                    .delete_matching(&[SweepPredicate::LastActivityAtOrBefore(
                        cutoff,
                    )]),
            )
            .await?;
        if removed > 0 {
            tracing::info!(removed, "swept idle sessions");
        }
        Ok(removed)
    }

    /// Approximate number of users online: sessions that are unexpired
    /// and were active within `active_window`.
    pub async fn active_count(&self) -> Result<u64, SessionError> {
        let now = self.inner.clock.now();
        let since = sub_saturating(now, self.inner.config.active_window);
        Ok(self
            .inner
            .bounded(self.inner.store.count_active(now, since))
            .await?)
    }
}

impl<S, U> Inner<S, U>
where
    S: SessionRepository,
    U: UserRepository,
{
    /// Applies `store_timeout` to a store call.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.store_timeout)),
        }
    }

    async fn check_uncoalesced(&self, id: &SessionId) -> Validation {
        let session = match self.bounded(self.store.find(id)).await {
            Ok(Some(session)) => session,
            Ok(None) => return Validation::Invalid(InvalidReason::NotFound),
            Err(e) => return degraded(id, &e),
        };

        let now = self.clock.now();
        if let Some(reason) = expiry_reason(&session, &self.config, now) {
            self.discard(&session, reason).await;
            return Validation::Invalid(reason);
        }

        let user = match self
            .bounded(self.users.find_active_user_by_id(session.user_id))
            .await
        {
            Ok(Some(user)) if user.can_hold_session() => user,
            Ok(_) => {
                self.discard(&session, InvalidReason::Deactivated).await;
                return Validation::Invalid(InvalidReason::Deactivated);
            }
            Err(e) => return degraded(id, &e),
        };

        Validation::Valid { session, user }
    }

    /// Deletes a record found to be dead. Failure is logged only: the
    /// caller reports invalid either way and the sweep retries later.
    async fn discard(&self, session: &Session, reason: InvalidReason) {
        match self.bounded(self.store.delete(&session.id)).await {
            Ok(_) => tracing::info!(
                session_id = %session.id,
                user_id = %session.user_id,
                %reason,
                "session invalidated"
            ),
            Err(e) => tracing::warn!(
                session_id = %session.id,
                %reason,
                error = %e,
                "failed to delete invalid session"
            ),
        }
    }

    async fn evict_excess(
        &self,
        user_id: UserId,
        keep: &SessionId,
    ) -> Result<(), StoreError> {
        let owned = self.bounded(self.store.list_for_user(user_id)).await?;
        let excess = owned
            .len()
            .saturating_sub(self.config.max_sessions_per_user);
        if excess == 0 {
            return Ok(());
        }

        let victims = owned.iter().filter(|s| &s.id != keep).take(excess);
        for victim in victims {
            self.bounded(self.store.delete(&victim.id)).await?;
            tracing::info!(
                session_id = %victim.id,
                %user_id,
                "evicted oldest session over retention bound"
            );
        }
        Ok(())
    }
}

/// Maps a store failure during validation to a fail-closed result.
fn degraded(id: &SessionId, error: &StoreError) -> Validation {
    tracing::warn!(
        session_id = %id,
        error = %error,
        "session store degraded, failing closed"
    );
    Validation::Invalid(InvalidReason::StoreUnavailable)
}

// =========================================================================
// Tests
// =========================================================================
