pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use waybill_core::queue::OfflineQueue;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Sync
        .route("/api/sync", post(routes::sync::run_sync))
        .route("/api/sync/status", get(routes::sync::get_status))
        .route("/api/sync/stats", get(routes::sync::get_stats))
        .route("/api/sync/events", get(routes::events::sse_status))
        // Actions
        .route(
            "/api/actions",
            get(routes::actions::list_actions).post(routes::actions::create_action),
        )
        .route(
            "/api/actions/completed",
            delete(routes::actions::purge_completed),
        )
        .route(
            "/api/actions/exhausted",
            delete(routes::actions::purge_exhausted),
        )
        .route(
            "/api/actions/{id}",
            get(routes::actions::get_action).delete(routes::actions::discard_action),
        )
        // Connectivity
        .route(
            "/api/connectivity",
            get(routes::connectivity::get_connectivity)
                .post(routes::connectivity::set_connectivity),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the queue's HTTP surface on a pre-bound listener until Ctrl-C.
pub async fn serve_on(queue: Arc<OfflineQueue>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let app = build_router(state::AppState::new(queue));

    tracing::info!("waybill server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("waybill server stopped");
    Ok(())
}

pub async fn serve(queue: Arc<OfflineQueue>, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    serve_on(queue, listener).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
