//! Online/offline signal and the drain it triggers on reconnect.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::SyncLane;

/// Current connectivity, observable by any number of tasks.
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record a new state. Returns whether it differed from the previous one.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(online, "connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct ConnectivityTrigger;

impl ConnectivityTrigger {
    /// Trigger a drain once at startup when already online, then on every
    /// offline-to-online transition. The task ends when the `Connectivity`
    /// it watches is dropped.
    pub fn spawn(mut rx: watch::Receiver<bool>, lane: SyncLane) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut online = *rx.borrow_and_update();
            if online {
                debug!("online at startup; triggering drain");
                lane.trigger();
            }
            while rx.changed().await.is_ok() {
                let now = *rx.borrow_and_update();
                if now && !online {
                    info!("back online; triggering drain");
                    lane.trigger();
                }
                online = now;
            }
            debug!("connectivity trigger stopped");
        })
    }
}
