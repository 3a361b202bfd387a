//! Running a checkpoint end to end.

use std::sync::Arc;

use gatekeep_session::{InvalidReason, SessionManager, Validation};
use gatekeep_store::{Session, SessionId, SessionRepository, UserRecord, UserRepository};
use gatekeep_token::CredentialBridge;

use crate::{
    Checkpoint, CredentialJar, GateConfig, GateError, GateReason,
    RequestContext, VerifiedSession,
};

/// The terminal result of a checkpoint. There is no retry state: the
/// next request starts over at the edge.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// The request may proceed.
    Authenticated {
        checkpoint: Checkpoint,
        session: Session,
        user: UserRecord,
        /// A re-issued token with fresh claims, already written to the jar.
        refreshed_token: Option<String>,
    },
    /// The session is over. The record is gone and the jar is cleared.
    Invalidated {
        checkpoint: Checkpoint,
        reason: GateReason,
    },
}

impl GateOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn reason(&self) -> Option<GateReason> {
        match self {
            Self::Authenticated { .. } => None,
            Self::Invalidated { reason, .. } => Some(*reason),
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Self::Authenticated { checkpoint, .. }
            | Self::Invalidated { checkpoint, .. } => *checkpoint,
        }
    }
}

/// Runs checkpoints: decode the token, validate the session, apply the
/// checkpoint's own rule, and on any failure clean up both sides.
pub struct RequestGate<S, U> {
    sessions: SessionManager<S, U>,
    bridge: Arc<CredentialBridge>,
    config: GateConfig,
}

impl<S, U> Clone for RequestGate<S, U> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            bridge: Arc::clone(&self.bridge),
            config: self.config.clone(),
        }
    }
}

impl<S, U> RequestGate<S, U>
where
    S: SessionRepository,
    U: UserRepository,
{
    pub fn new(
        sessions: SessionManager<S, U>,
        bridge: Arc<CredentialBridge>,
        config: GateConfig,
    ) -> Self {
        Self {
            sessions,
            bridge,
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager<S, U> {
        &self.sessions
    }

    pub fn bridge(&self) -> &CredentialBridge {
        &self.bridge
    }

    /// Runs one checkpoint.
    ///
    /// The token comes from `ctx.token`, or from the jar when the context
    /// has none. Never fails open: every path that cannot prove the
    /// session alive ends in [`GateOutcome::Invalidated`].
    pub async fn check<J: CredentialJar>(
        &self,
        checkpoint: Checkpoint,
        ctx: &RequestContext,
        jar: &mut J,
    ) -> GateOutcome {
        let token = presented_token(ctx, jar);
        let verified = match self.verify(checkpoint, token).await {
            Ok(verified) => verified,
            Err((id, reason)) => {
                return self.invalidate(checkpoint, id.as_ref(), reason, jar);
            }
        };

        // The manager already discarded records it found dead. A record
        // rejected here is still live and must go.
        if let Err(reason) = checkpoint.inspect(&verified, ctx) {
            let id = &verified.session.id;
            if let Err(e) = self.sessions.delete(id).await {
                tracing::warn!(session_id = %id, error = %e, "failed to delete session");
            }
            return self.invalidate(checkpoint, Some(id), reason, jar);
        }

        let refreshed_token = self.maybe_refresh(&verified, jar);

        tracing::debug!(
            %checkpoint,
            session_id = %verified.session.id,
            refreshed = refreshed_token.is_some(),
            "checkpoint passed"
        );

        GateOutcome::Authenticated {
            checkpoint,
            session: verified.session,
            user: verified.user,
            refreshed_token,
        }
    }

    /// Runs checkpoints in order, stopping at the first invalidation.
    ///
    /// An empty chain runs [`Checkpoint::Edge`].
    pub async fn check_chain<J: CredentialJar>(
        &self,
        chain: &[Checkpoint],
        ctx: &RequestContext,
        jar: &mut J,
    ) -> GateOutcome {
        let chain = if chain.is_empty() { &[Checkpoint::Edge][..] } else { chain };
        let mut ctx = ctx.clone();
        let mut last = None;
        for &checkpoint in chain {
            let outcome = self.check(checkpoint, &ctx, jar).await;
            match &outcome {
                GateOutcome::Invalidated { .. } => return outcome,
                GateOutcome::Authenticated { refreshed_token, .. } => {
                    if let Some(token) = refreshed_token {
                        ctx.token = Some(token.clone());
                    }
                }
            }
            last = Some(outcome);
        }
        match last {
            Some(outcome) => outcome,
            None => GateOutcome::Invalidated {
                checkpoint: Checkpoint::Edge,
                reason: GateReason::MissingToken,
            },
        }
    }

    /// Explicit logout: deletes the session named by the presented token
    /// and clears the jar. Returns `true` if a record was removed.
    ///
    /// The jar is cleared even when the token is invalid or the store
    /// fails.
    ///
    /// # Errors
    /// - [`GateError::Envelope`] if the token is missing or fails decoding
    /// - [`GateError::Session`] if the store failed
    pub async fn logout<J: CredentialJar>(
        &self,
        ctx: &RequestContext,
        jar: &mut J,
    ) -> Result<bool, GateError> {
        let token = presented_token(ctx, jar);
        jar.clear();
        let token = token.ok_or(gatekeep_token::EnvelopeError::Malformed("no token"))?;
        let decoded = self.bridge.decode(&token)?;
        let removed = self.sessions.delete(decoded.session_id()).await?;
        tracing::info!(session_id = %decoded.session_id(), removed, "logged out");
        Ok(removed)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn verify(
        &self,
        checkpoint: Checkpoint,
        token: Option<String>,
    ) -> Result<VerifiedSession, (Option<SessionId>, GateReason)> {
        let Some(token) = token else {
            return Err((None, GateReason::MissingToken));
        };

        // An unverified token's session id is attacker-controlled, so a
        // failed decode never deletes anything.
        let decoded = self
            .bridge
            .decode(&token)
            .map_err(|_| (None, GateReason::Session(InvalidReason::EnvelopeInvalid)))?;
        let id = decoded.session_id().clone();

        let validation = if checkpoint.records_activity() {
            self.sessions.validate(&id).await
        } else {
            self.sessions.validate_passive(&id).await
        };

        match validation {
            Validation::Valid { session, user } => Ok(VerifiedSession {
                session,
                user,
                claims: decoded.claims,
            }),
            Validation::Invalid(reason) => Err((Some(id), reason.into())),
        }
    }

    /// Clears the jar and reports. Never touches the store.
    fn invalidate<J: CredentialJar>(
        &self,
        checkpoint: Checkpoint,
        id: Option<&SessionId>,
        reason: GateReason,
        jar: &mut J,
    ) -> GateOutcome {
        jar.clear();

        match reason {
            GateReason::MissingToken => {
                tracing::debug!(%checkpoint, "no session token presented");
            }
            _ => tracing::warn!(
                %checkpoint,
                reason = %reason,
                session_id = ?id.map(SessionId::prefix),
                "session invalidated"
            ),
        }

        GateOutcome::Invalidated { checkpoint, reason }
    }

    fn maybe_refresh<J: CredentialJar>(
        &self,
        verified: &VerifiedSession,
        jar: &mut J,
    ) -> Option<String> {
        let now = self.bridge.now();
        if !self.bridge.refresh_due(&verified.claims, &verified.user, now) {
            return None;
        }
        match self.bridge.refresh(&verified.session, &verified.user) {
            Ok(token) => {
                jar.store(&token);
                Some(token)
            }
            Err(e) => {
                // The current token stays valid until its own expiry.
                tracing::warn!(
                    session_id = %verified.session.id,
                    error = %e,
                    "token refresh failed"
                );
                None
            }
        }
    }
}

fn presented_token<J: CredentialJar>(ctx: &RequestContext, jar: &J) -> Option<String> {
    ctx.token
        .as_deref()
        .or_else(|| jar.token())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}
