//! The application-facing queue: store, lane, status fan-out and
//! connectivity wired together.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionId, ActionPayload};
use crate::connectivity::{Connectivity, ConnectivityTrigger};
use crate::engine::{DrainReport, SyncEngine, SyncLane};
use crate::error::Result;
use crate::executor::Executor;
use crate::status::{StatusBroadcaster, StatusListener, SubscriptionId, SyncStatus};
use crate::store::{run_blocking, ActionStore, SyncStats};

/// What `submit` did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Sent to the backend immediately.
    Applied,
    /// Stored for the next drain.
    Queued(ActionId),
}

pub struct OfflineQueue {
    store: Arc<ActionStore>,
    executor: Arc<dyn Executor>,
    broadcaster: Arc<StatusBroadcaster>,
    lane: SyncLane,
    connectivity: Connectivity,
    tasks: Vec<JoinHandle<()>>,
}

impl OfflineQueue {
    /// Recover interrupted actions and start the lane worker and the
    /// connectivity trigger. Must be called inside a tokio runtime.
    pub fn start(store: ActionStore, executor: Arc<dyn Executor>, online: bool) -> Result<Self> {
        let recovered = store.recover_interrupted()?;
        if recovered > 0 {
            warn!(recovered, "recovered actions interrupted mid-sync");
        }

        let store = Arc::new(store);
        let broadcaster = Arc::new(StatusBroadcaster::new());
        let (lane, lane_task) =
            SyncEngine::new(store.clone(), executor.clone(), broadcaster.clone()).spawn();
        let connectivity = Connectivity::new(online);
        let trigger_task = ConnectivityTrigger::spawn(connectivity.subscribe(), lane.clone());

        info!(online, retry_cap = store.retry_cap(), "offline queue started");
        Ok(Self {
            store,
            executor,
            broadcaster,
            lane,
            connectivity,
            tasks: vec![lane_task, trigger_task],
        })
    }

    // -----------------------------------------------------------------------
    // Queueing
    // -----------------------------------------------------------------------

    /// Persist a payload for later replay and notify listeners.
    pub async fn queue_action(&self, payload: ActionPayload) -> Result<ActionId> {
        let id = run_blocking(&self.store, move |s| s.enqueue(payload)).await?;
        self.notify().await;
        Ok(id)
    }

    /// Apply now when online, otherwise queue.
    ///
    /// A backend failure while online is returned to the caller rather than
    /// queued, so the caller can surface it.
    pub async fn submit(&self, payload: ActionPayload) -> Result<Submitted> {
        if self.connectivity.is_online() {
            self.executor.apply(&payload).await?;
            debug!(kind = %payload.kind(), "applied directly");
            Ok(Submitted::Applied)
        } else {
            Ok(Submitted::Queued(self.queue_action(payload).await?))
        }
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Fire-and-forget drain request.
    pub fn trigger_sync(&self) -> bool {
        self.lane.trigger()
    }

    /// Drain and wait for the cycle that served the request.
    pub async fn sync(&self) -> Result<DrainReport> {
        self.lane.drain().await
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Returns whether the state changed. Going online triggers a drain.
    pub fn set_online(&self, online: bool) -> bool {
        self.connectivity.set_online(online)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub async fn status(&self) -> Result<SyncStatus> {
        let stats = self.stats().await?;
        Ok(SyncStatus::from_stats(&stats, self.lane.is_busy()))
    }

    pub async fn stats(&self) -> Result<SyncStats> {
        run_blocking(&self.store, |s| s.stats()).await
    }

    pub async fn get(&self, id: ActionId) -> Result<Option<Action>> {
        run_blocking(&self.store, move |s| s.get(id)).await
    }

    pub async fn list_all(&self) -> Result<Vec<Action>> {
        run_blocking(&self.store, |s| s.list_all()).await
    }

    pub async fn list_eligible(&self) -> Result<Vec<Action>> {
        run_blocking(&self.store, |s| s.list_eligible()).await
    }

    pub fn retry_cap(&self) -> u32 {
        self.store.retry_cap()
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    pub async fn purge_completed(&self) -> Result<u64> {
        let removed = run_blocking(&self.store, |s| s.purge_completed()).await?;
        self.notify().await;
        Ok(removed)
    }

    pub async fn purge_exhausted(&self) -> Result<u64> {
        let removed = run_blocking(&self.store, |s| s.purge_exhausted()).await?;
        self.notify().await;
        Ok(removed)
    }

    pub async fn discard(&self, id: ActionId) -> Result<Action> {
        let action = run_blocking(&self.store, move |s| s.discard(id)).await?;
        self.notify().await;
        Ok(action)
    }

    // -----------------------------------------------------------------------
    // Status listeners
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, listener: impl StatusListener + 'static) -> SubscriptionId {
        self.broadcaster.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    async fn notify(&self) {
        match self.status().await {
            Ok(status) => self.broadcaster.publish(status),
            Err(e) => warn!(error = %e, "could not compute sync status"),
        }
    }

    /// Drop all listeners and stop the background tasks. A cycle already in
    /// progress runs to completion first.
    pub async fn shutdown(self) {
        self.broadcaster.shutdown();
        let Self {
            lane,
            connectivity,
            tasks,
            ..
        } = self;
        drop(connectivity);
        drop(lane);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "queue task ended abnormally");
            }
        }
        info!("offline queue stopped");
    }
}
