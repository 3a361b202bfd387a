//! The periodic check while a protected view is open.
//!
//! A page that stays open for an hour would otherwise keep rendering
//! after an administrator deactivated the account five minutes in. The
//! heartbeat runs [`Checkpoint::Heartbeat`] on a fixed interval and
//! reports the first invalidation, then stops.
//!
//! ```text
//! spawn() ──→ [tick] ──check──→ Authenticated ──→ [tick] ...
//!                        │
//!                        └──→ Invalidated ──→ report reason, exit
//! stop()  ──→ exit, hand back the jar
//! ```

use gatekeep_store::{SessionRepository, UserRepository};
use gatekeep_tick::{TickConfig, TickScheduler};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{
    Checkpoint, CredentialJar, GateError, GateOutcome, GateReason,
    RequestContext, RequestGate,
};

/// Handle to a running heartbeat task.
///
/// Dropping the handle stops the task as well; [`stop`](Self::stop) does
/// the same and also hands back the jar.
pub struct Heartbeat<J> {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<J>,
}

impl<J> Heartbeat<J>
where
    J: CredentialJar + Send + 'static,
{
    /// Starts checking the session in `ctx` / `jar` every
    /// `heartbeat_interval`. The first check runs one interval from now.
    ///
    /// The returned receiver resolves with the reason once the session is
    /// invalidated. It errors if the heartbeat is stopped first.
    pub fn spawn<S, U>(
        gate: RequestGate<S, U>,
        ctx: RequestContext,
        jar: J,
    ) -> (Self, oneshot::Receiver<GateReason>)
    where
        S: SessionRepository,
        U: UserRepository,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (report_tx, report_rx) = oneshot::channel();
        let task = tokio::spawn(run(gate, ctx, jar, stop_rx, report_tx));
        (
            Self {
                stop: Some(stop_tx),
                task,
            },
            report_rx,
        )
    }

    /// `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the heartbeat and returns the jar with whatever the checks
    /// wrote to it (re-issued tokens, cleared cookies).
    ///
    /// # Errors
    /// [`GateError::Heartbeat`] if the task panicked or was aborted.
    pub async fn stop(mut self) -> Result<J, GateError> {
        if let Some(stop) = self.stop.take() {
            // The task may already have exited after an invalidation.
            let _ = stop.send(());
        }
        self.task
            .await
            .map_err(|e| GateError::Heartbeat(e.to_string()))
    }
}

async fn run<S, U, J>(
    gate: RequestGate<S, U>,
    mut ctx: RequestContext,
    mut jar: J,
    mut stop: oneshot::Receiver<()>,
    report: oneshot::Sender<GateReason>,
) -> J
where
    S: SessionRepository,
    U: UserRepository,
    J: CredentialJar + Send + 'static,
{
    let mut scheduler =
        TickScheduler::new(TickConfig::every(gate.config().heartbeat_interval));
    tracing::debug!(
        interval_ms = scheduler.interval().as_millis() as u64,
        "heartbeat started"
    );

    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::debug!("heartbeat stopped");
                break;
            }
            tick = scheduler.wait_for_tick() => {
                let outcome = gate.check(Checkpoint::Heartbeat, &ctx, &mut jar).await;
                scheduler.record_tick_end();
                match outcome {
                    GateOutcome::Authenticated { refreshed_token, .. } => {
                        if let Some(token) = refreshed_token {
                            ctx.token = Some(token);
                        }
                    }
                    GateOutcome::Invalidated { reason, .. } => {
                        tracing::info!(
                            tick = tick.tick,
                            reason = %reason,
                            "heartbeat detected invalid session"
                        );
                        let _ = report.send(reason);
                        break;
                    }
                }
            }
        }
    }

    jar
}
