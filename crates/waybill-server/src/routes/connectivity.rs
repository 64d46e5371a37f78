use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectivityBody {
    pub online: bool,
}

/// GET /api/connectivity
pub async fn get_connectivity(State(app): State<AppState>) -> Json<ConnectivityBody> {
    Json(ConnectivityBody {
        online: app.queue.is_online(),
    })
}

/// POST /api/connectivity: the host reports a network transition. Going
/// online starts a drain in the background.
pub async fn set_connectivity(
    State(app): State<AppState>,
    Json(body): Json<ConnectivityBody>,
) -> Json<serde_json::Value> {
    let changed = app.queue.set_online(body.online);
    Json(serde_json::json!({ "online": body.online, "changed": changed }))
}
