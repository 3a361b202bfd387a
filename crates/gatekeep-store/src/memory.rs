//! In-memory repositories.
//!
//! Used as the test fake for the lifecycle manager, and usable as a real
//! store for single-process deployments that accept losing sessions on
//! restart. Both stores are cheap to clone; clones share state.
//!
//! [`MemorySessionStore`] also supports fault injection (added latency,
//! forced failures) and counts how many deletions actually removed a
//! record, which is what the concurrency tests assert on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    Session, SessionId, SessionRepository, StoreError, SweepPredicate,
    UserId, UserRecord, UserRepository,
};

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionInner {
    sessions: RwLock<HashMap<SessionId, Session>>,
    closed: AtomicBool,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    removals: AtomicU64,
}

/// A [`SessionRepository`] backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<SessionInner>,
}

impl MemorySessionStore {
    /// Creates an empty, open store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency` (on Tokio's clock).
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Makes every operation fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::Relaxed);
    }

    /// How many `delete`/bulk-delete calls actually removed a record.
    pub fn removals(&self) -> u64 {
        self.inner.removals.load(Ordering::Relaxed)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// `true` if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reads a record without any fault injection. For assertions.
    pub async fn peek(&self, id: &SessionId) -> Option<Session> {
        self.inner.sessions.read().await.get(id).cloned()
    }

    /// Writes a record directly, bypassing the manager. For test setup.
    pub async fn put(&self, session: Session) {
        self.inner
            .sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Applies latency and the open/failing checks shared by every call.
    async fn gate(&self) -> Result<(), StoreError> {
        let latency = self.inner.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if self.inner.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

impl SessionRepository for MemorySessionStore {
    async fn open(&self) -> Result<(), StoreError> {
        self.inner.closed.store(false, Ordering::Release);
        tracing::debug!("memory session store opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.closed.store(true, Ordering::Release);
        tracing::debug!("memory session store closed");
        Ok(())
    }

    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        self.gate().await?;
        let mut sessions = self.inner.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate);
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find(
        &self,
        id: &SessionId,
    ) -> Result<Option<Session>, StoreError> {
        self.gate().await?;
        Ok(self.inner.sessions.read().await.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> Result<bool, StoreError> {
        self.gate().await?;
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch(
        &self,
        id: &SessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.gate().await?;
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get_mut(id) {
            Some(stored) => {
                if at > stored.last_activity {
                    stored.last_activity = at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.gate().await?;
        let removed = self.inner.sessions.write().await.remove(id).is_some();
        if removed {
            self.inner.removals.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn delete_for_user(&self, user: UserId) -> Result<u64, StoreError> {
        self.gate().await?;
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user);
        let removed = (before - sessions.len()) as u64;
        self.inner.removals.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn list_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<Session>, StoreError> {
        self.gate().await?;
        let mut owned: Vec<Session> = self
            .inner
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user)
            .cloned()
            .collect();
        // Ties on created_at are broken by id so the order is stable.
        owned.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(owned)
    }

    async fn delete_matching(
        &self,
        predicates: &[SweepPredicate],
    ) -> Result<u64, StoreError> {
        self.gate().await?;
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !predicates.iter().any(|p| p.matches(s)));
        let removed = (before - sessions.len()) as u64;
        self.inner.removals.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn count_active(
        &self,
        now: DateTime<Utc>,
        active_since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.gate().await?;
        let count = self
            .inner
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.expires_at > now && s.last_activity > active_since)
            .count();
        Ok(count as u64)
    }
}

// ---------------------------------------------------------------------------
// MemoryUserStore
// ---------------------------------------------------------------------------

/// A [`UserRepository`] backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<UserId, UserRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryUserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an account.
    pub async fn upsert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }

    /// Marks an account inactive. Returns `false` if it doesn't exist.
    pub async fn deactivate(&self, id: UserId) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Applies an arbitrary change to an account (role, verification).
    pub async fn modify(&self, id: UserId, f: impl FnOnce(&mut UserRecord)) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            f(user);
        }
    }

    /// Removes an account entirely.
    pub async fn remove(&self, id: UserId) {
        self.users.write().await.remove(&id);
    }

    /// Makes lookups fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl UserRepository for MemoryUserStore {
    async fn find_active_user_by_id(
        &self,
        id: UserId,
    ) -> Result<Option<UserRecord>, StoreError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(self.users.read().await.get(&id).cloned())
    }
}
