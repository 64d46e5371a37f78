use std::sync::Arc;

use tokio::sync::broadcast;
use waybill_core::queue::OfflineQueue;
use waybill_core::status::SyncStatus;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<OfflineQueue>,
    /// Every status snapshot the queue publishes, for SSE subscribers.
    pub status_tx: broadcast::Sender<SyncStatus>,
}

impl AppState {
    pub fn new(queue: Arc<OfflineQueue>) -> Self {
        let (status_tx, _) = broadcast::channel(64);
        let tx = status_tx.clone();
        queue.subscribe(move |status: &SyncStatus| {
            // No SSE clients connected is fine.
            let _ = tx.send(*status);
        });
        Self { queue, status_tx }
    }
}
