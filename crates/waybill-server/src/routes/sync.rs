use axum::extract::State;
use axum::Json;
use waybill_core::engine::DrainReport;
use waybill_core::status::SyncStatus;
use waybill_core::store::SyncStats;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/sync/status: syncing flag plus pending/failed counts.
pub async fn get_status(State(app): State<AppState>) -> Result<Json<SyncStatus>, AppError> {
    Ok(Json(app.queue.status().await?))
}

/// GET /api/sync/stats: per-status totals.
pub async fn get_stats(State(app): State<AppState>) -> Result<Json<SyncStats>, AppError> {
    Ok(Json(app.queue.stats().await?))
}

/// POST /api/sync: run a drain cycle and wait for its report.
pub async fn run_sync(State(app): State<AppState>) -> Result<Json<DrainReport>, AppError> {
    Ok(Json(app.queue.sync().await?))
}
