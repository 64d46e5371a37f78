use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/sync/events: SSE stream that emits `status` with every snapshot.
pub async fn sse_status(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.status_tx.subscribe();
    // Lagged receivers skip to the newest snapshot.
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let status = msg.ok()?;
        let event = Event::default().event("status").json_data(status).ok()?;
        Some(Ok::<Event, Infallible>(event))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
