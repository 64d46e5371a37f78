use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use waybill_core::action::{Action, ActionId, ActionPayload};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub eligible: bool,
}

/// GET /api/actions: all actions in replay order, or only the eligible ones.
pub async fn list_actions(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Action>>, AppError> {
    let actions = if params.eligible {
        app.queue.list_eligible().await?
    } else {
        app.queue.list_all().await?
    };
    Ok(Json(actions))
}

/// POST /api/actions: queue a payload for the next drain.
pub async fn create_action(
    State(app): State<AppState>,
    Json(payload): Json<ActionPayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let kind = payload.kind();
    let id = app.queue.queue_action(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "kind": kind.as_str() })),
    ))
}

/// GET /api/actions/{id}
pub async fn get_action(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Action>, AppError> {
    let id = ActionId(id);
    match app.queue.get(id).await? {
        Some(action) => Ok(Json(action)),
        None => Err(waybill_core::WaybillError::ActionNotFound(id).into()),
    }
}

/// DELETE /api/actions/{id}: drop one action that is not mid-sync.
pub async fn discard_action(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(app.queue.discard(ActionId(id)).await?))
}

/// DELETE /api/actions/completed
pub async fn purge_completed(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let purged = app.queue.purge_completed().await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

/// DELETE /api/actions/exhausted: drop failed actions that hit the retry cap.
pub async fn purge_exhausted(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let purged = app.queue.purge_exhausted().await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}
