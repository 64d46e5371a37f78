//! Replays queued actions against the backend.
//!
//! All execution happens on one worker task (the sync lane) that consumes
//! drain requests from a channel, so at most one action is in flight at a
//! time and actions finish in replay order. Requests that arrive while a
//! cycle is running join that cycle instead of starting another one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::{Action, ActionId, ActionStatus};
use crate::error::{Result, WaybillError};
use crate::executor::Executor;
use crate::status::{StatusBroadcaster, SyncStatus};
use crate::store::{run_blocking, ActionStore};

/// Drain requests that may wait behind a running cycle.
const LANE_CAPACITY: usize = 8;

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub attempted: u32,
    pub completed: u32,
    pub failed: u32,
    /// Failures in this cycle that used up the last attempt.
    pub exhausted: u32,
    /// Snapshot entries that changed underneath the cycle (e.g. discarded).
    pub skipped: u32,
}

pub struct SyncEngine {
    store: Arc<ActionStore>,
    executor: Arc<dyn Executor>,
    broadcaster: Arc<StatusBroadcaster>,
    busy: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<ActionStore>,
        executor: Arc<dyn Executor>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Self {
        Self {
            store,
            executor,
            broadcaster,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the lane worker. The worker exits once every `SyncLane` clone
    /// has been dropped.
    pub fn spawn(self) -> (SyncLane, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<DrainRequest>(LANE_CAPACITY);
        let lane = SyncLane {
            tx,
            busy: self.busy.clone(),
        };

        let handle = tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut waiters: Vec<_> = first.reply.into_iter().collect();

                self.busy.store(true, Ordering::Release);
                let outcome = self.run_cycle().await;
                while let Ok(extra) = rx.try_recv() {
                    waiters.extend(extra.reply);
                }
                self.busy.store(false, Ordering::Release);
                self.notify().await;

                match &outcome {
                    Ok(report) => info!(
                        attempted = report.attempted,
                        completed = report.completed,
                        failed = report.failed,
                        exhausted = report.exhausted,
                        "drain cycle finished"
                    ),
                    Err(e) => error!(error = %e, "drain cycle aborted"),
                }

                let shared = outcome.map_err(|e| e.to_string());
                for waiter in waiters {
                    let _ = waiter.send(shared.clone());
                }
            }
            debug!("sync lane closed");
        });

        (lane, handle)
    }

    /// One pass over the actions eligible when the cycle starts.
    ///
    /// Execution failures are recorded on the action and never returned;
    /// only storage errors abort the cycle.
    async fn run_cycle(&self) -> Result<DrainReport> {
        let actions = run_blocking(&self.store, |s| s.list_eligible()).await?;
        let cap = self.store.retry_cap();
        let mut report = DrainReport::default();
        info!(eligible = actions.len(), "drain cycle started");

        for queued in actions {
            let id = queued.id;
            let action = match self.transition(id, ActionStatus::Syncing).await {
                Ok(action) => action,
                Err(WaybillError::ActionNotFound(_)) | Err(WaybillError::InvalidTransition { .. }) => {
                    debug!(action_id = %id, "action changed since cycle start; skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.notify().await;
            report.attempted += 1;

            match self.executor.execute(&action).await {
                Ok(()) => {
                    self.transition(id, ActionStatus::Completed).await?;
                    report.completed += 1;
                    debug!(action_id = %id, kind = %action.kind(), "action synced");
                }
                Err(e) => {
                    let reason = e.to_string();
                    let failed = run_blocking(&self.store, move |s| s.mark_failed(id, &reason)).await?;
                    report.failed += 1;
                    if failed.retry_count >= cap {
                        report.exhausted += 1;
                    }
                    warn!(
                        action_id = %id,
                        kind = %failed.kind(),
                        retry_count = failed.retry_count,
                        retry_cap = cap,
                        error = %e,
                        "action sync failed"
                    );
                }
            }
            self.notify().await;
        }

        Ok(report)
    }

    async fn transition(&self, id: ActionId, status: ActionStatus) -> Result<Action> {
        run_blocking(&self.store, move |s| s.update_status(id, status, 0)).await
    }

    async fn notify(&self) {
        let syncing = self.busy.load(Ordering::Acquire);
        match run_blocking(&self.store, |s| s.stats()).await {
            Ok(stats) => self.broadcaster.publish(SyncStatus::from_stats(&stats, syncing)),
            Err(e) => warn!(error = %e, "could not compute sync status"),
        }
    }
}

struct DrainRequest {
    reply: Option<oneshot::Sender<std::result::Result<DrainReport, String>>>,
}

/// Handle to the serial execution lane. Cheap to clone.
#[derive(Clone)]
pub struct SyncLane {
    tx: mpsc::Sender<DrainRequest>,
    busy: Arc<AtomicBool>,
}

impl SyncLane {
    /// Ask for a drain without waiting for it.
    ///
    /// Returns `false` when the request was dropped because enough requests
    /// are already waiting (they will cover it) or the lane is closed.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(DrainRequest { reply: None }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("drain already queued");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("drain requested on a closed sync lane");
                false
            }
        }
    }

    /// Request a drain and wait for the report of the cycle that served it.
    pub async fn drain(&self) -> Result<DrainReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DrainRequest { reply: Some(reply) })
            .await
            .map_err(|_| WaybillError::LaneClosed)?;
        rx.await
            .map_err(|_| WaybillError::LaneClosed)?
            .map_err(WaybillError::Store)
    }

    /// Whether a drain cycle is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
