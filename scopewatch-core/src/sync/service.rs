//! Single-consumer sync worker
//!
//! Navigations, manual flush requests and the retry timer all feed one task
//! that owns the [`Orchestrator`]. Commands are processed one at a time to
//! completion, so at most one delivery attempt is ever in flight. Submitting
//! a navigation never waits for delivery: it is queued on an unbounded
//! channel and picked up after whatever is currently running.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::orchestrator::{FlushOutcome, Orchestrator};
use super::SyncStats;
use crate::error::{Error, Result};
use crate::store::StateStore;
use crate::types::NavigationEvent;

/// Answer to a manual flush request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushReply {
    pub ok: bool,
}

enum SyncCommand {
    Navigation(NavigationEvent),
    Flush(oneshot::Sender<FlushReply>),
    Stats(oneshot::Sender<SyncStats>),
}

/// Cloneable sender side of the sync worker
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    /// Hand a navigation to the worker without waiting for it to be processed
    pub fn submit(&self, event: NavigationEvent) -> Result<()> {
        self.tx
            .send(SyncCommand::Navigation(event))
            .map_err(|_| Error::WorkerStopped)
    }

    /// Flush the queue now and wait for the attempt to resolve
    pub async fn request_flush(&self) -> Result<FlushReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::Flush(reply_tx))
            .map_err(|_| Error::WorkerStopped)?;
        reply_rx.await.map_err(|_| Error::WorkerStopped)
    }

    /// Current worker counters
    pub async fn stats(&self) -> Result<SyncStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::Stats(reply_tx))
            .map_err(|_| Error::WorkerStopped)?;
        reply_rx.await.map_err(|_| Error::WorkerStopped)
    }
}

/// Start the worker task.
///
/// The task runs until every [`SyncHandle`] is dropped, finishes the commands
/// already queued, and then returns the orchestrator.
pub fn spawn<S>(orchestrator: Orchestrator<S>) -> (SyncHandle, JoinHandle<Orchestrator<S>>)
where
    S: StateStore + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(orchestrator, rx));
    (SyncHandle { tx }, task)
}

async fn run<S: StateStore>(
    mut orchestrator: Orchestrator<S>,
    mut rx: mpsc::UnboundedReceiver<SyncCommand>,
) -> Orchestrator<S> {
    let period = orchestrator.options().flush_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(flush_interval = ?period, "Sync worker started");

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(command) => dispatch(&mut orchestrator, command).await,
                None => break,
            },
            _ = ticker.tick() => {
                tracing::debug!("Retry timer fired");
                flush(&mut orchestrator).await;
            }
        }
    }

    tracing::info!(stats = ?orchestrator.stats(), "Sync worker stopped");
    orchestrator
}

async fn dispatch<S: StateStore>(orchestrator: &mut Orchestrator<S>, command: SyncCommand) {
    match command {
        SyncCommand::Navigation(event) => {
            if let Err(e) = orchestrator.handle_navigation(&event).await {
                tracing::error!(error = %e, "Navigation processing aborted");
            }
        }
        SyncCommand::Flush(reply) => {
            let ok = flush(orchestrator).await;
            // Requester may have gone away; nothing to do then
            let _ = reply.send(FlushReply { ok });
        }
        SyncCommand::Stats(reply) => {
            let _ = reply.send(orchestrator.stats().clone());
        }
    }
}

async fn flush<S: StateStore>(orchestrator: &mut Orchestrator<S>) -> bool {
    match orchestrator.flush().await {
        Ok(outcome) => outcome.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Flush aborted");
            false
        }
    }
}

// `FlushOutcome` is the detailed form of `FlushReply`
impl From<&FlushOutcome> for FlushReply {
    fn from(outcome: &FlushOutcome) -> Self {
        Self {
            ok: outcome.is_ok(),
        }
    }
}
