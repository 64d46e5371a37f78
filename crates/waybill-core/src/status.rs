//! In-process fan-out of aggregate queue state.
//!
//! Listeners are called synchronously on the publishing task, in
//! subscription order. A panicking listener is logged and skipped; the
//! remaining listeners are still notified.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::SyncStats;

/// Snapshot pushed to listeners after every store mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub syncing: bool,
    pub pending: u64,
    pub failed: u64,
}

impl SyncStatus {
    pub fn from_stats(stats: &SyncStats, syncing: bool) -> Self {
        Self {
            syncing,
            pending: stats.pending,
            failed: stats.failed,
        }
    }
}

pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: &SyncStatus);
}

impl<F> StatusListener for F
where
    F: Fn(&SyncStatus) + Send + Sync,
{
    fn on_status(&self, status: &SyncStatus) {
        self(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Entry = (SubscriptionId, Arc<dyn StatusListener>);

#[derive(Default)]
pub struct StatusBroadcaster {
    listeners: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        // A listener cannot poison this lock: it is never held while calling out.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, listener: impl StatusListener + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self.closed.load(Ordering::Acquire) {
            debug!("subscribe after shutdown ignored");
            return id;
        }
        let listener: Arc<dyn StatusListener> = Arc::new(listener);
        self.entries().push((id, listener));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(sid, _)| *sid != id);
        entries.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.entries().len()
    }

    pub fn publish(&self, status: SyncStatus) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // Call out on a snapshot so listeners may (un)subscribe re-entrantly.
        let snapshot: Vec<Entry> = self.entries().clone();
        for (id, listener) in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_status(&status)));
            if result.is_err() {
                warn!(subscription = id.0, "status listener panicked");
            }
        }
    }

    /// Drop every listener; later publishes and subscriptions are no-ops.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.entries().clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
