//! Repository seams between the session core and the account database.
//!
//! The persistent store belongs to the surrounding application. The core
//! only needs the narrow set of operations below, so that is all the
//! traits ask for. Implement them over whatever the application already
//! uses (an ORM, a key-value store); use the in-memory versions in tests.
//!
//! Every method returns a `Send` future: the lifecycle manager moves
//! repository calls into spawned Tokio tasks (background activity writes,
//! coalesced validations), and a generic `async fn` in a trait cannot
//! promise that.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{Session, SessionId, StoreError, UserId, UserRecord};

/// A predicate for bulk deletion during maintenance sweeps.
///
/// Each variant is a range query on one timestamp column, which is what
/// an indexed SQL `DELETE ... WHERE col <= $1` can serve directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPredicate {
    /// `expires_at <= cutoff`
    ExpiresAtOrBefore(DateTime<Utc>),
    /// `last_activity <= cutoff`
    LastActivityAtOrBefore(DateTime<Utc>),
    /// `created_at <= cutoff`
    CreatedAtOrBefore(DateTime<Utc>),
}

impl SweepPredicate {
    /// Evaluates the predicate against a record.
    pub fn matches(&self, session: &Session) -> bool {
        match *self {
            Self::ExpiresAtOrBefore(cutoff) => session.expires_at <= cutoff,
            Self::LastActivityAtOrBefore(cutoff) => {
                session.last_activity <= cutoff
            }
            Self::CreatedAtOrBefore(cutoff) => session.created_at <= cutoff,
        }
    }
}

/// Persistent storage for session records.
///
/// # Contract
///
/// - Missing records are not errors: `find` returns `Ok(None)`, `delete`
///   and `touch` return `Ok(false)`.
/// - `delete` and `delete_for_user` are idempotent.
/// - Operations on a closed repository return [`StoreError::Closed`].
pub trait SessionRepository: Send + Sync + 'static {
    /// Opens the repository (connects, prepares statements).
    fn open(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Closes the repository. Later calls fail with [`StoreError::Closed`].
    fn close(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persists a new record.
    fn insert(
        &self,
        session: Session,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Looks up a record by identifier.
    fn find(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Replaces a stored record. Returns `false` if it no longer exists.
    fn update(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Moves `last_activity` forward to `at`, never backwards.
    /// Returns `false` if the record no longer exists.
    fn touch(
        &self,
        id: &SessionId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes a record. Returns `true` if this call removed it.
    fn delete(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes every record owned by `user`. Returns how many were removed.
    fn delete_for_user(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Lists the records owned by `user`, oldest first.
    fn list_for_user(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<Session>, StoreError>> + Send;

    /// Removes every record matching ANY of the predicates.
    fn delete_matching(
        &self,
        predicates: &[SweepPredicate],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Counts records with `expires_at > now` and
    /// `last_activity > active_since`.
    fn count_active(
        &self,
        now: DateTime<Utc>,
        active_since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Read access to the external account store.
pub trait UserRepository: Send + Sync + 'static {
    /// Returns the account's current state, or `None` if it doesn't exist.
    fn find_active_user_by_id(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send;
}
