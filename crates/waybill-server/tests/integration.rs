use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;
use waybill_core::action::ActionPayload;
use waybill_core::executor::Executor;
use waybill_core::queue::OfflineQueue;
use waybill_core::store::ActionStore;
use waybill_core::BackendError;
use waybill_server::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Counts calls; fails while `failing` is set.
#[derive(Default)]
struct StubBackend {
    calls: AtomicUsize,
    failing: AtomicBool,
}

#[async_trait]
impl Executor for StubBackend {
    async fn apply(&self, _payload: &ActionPayload) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    backend: Arc<StubBackend>,
    app: axum::Router,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = ActionStore::open(&dir.path().join("actions.redb"), 3).unwrap();
    let backend = Arc::new(StubBackend::default());
    let queue = OfflineQueue::start(store, backend.clone(), false).unwrap();
    let app = waybill_server::build_router(AppState::new(Arc::new(queue)));
    Fixture {
        _dir: dir,
        backend,
        app,
    }
}

fn update(id: i64) -> serde_json::Value {
    json!({
        "kind": "record_update",
        "collection": "deliveries",
        "record_id": id,
        "fields": {"status": "COMPLETED"}
    })
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

async fn delete(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "DELETE", uri, None).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_shows_up_in_status() {
    let f = fixture();
    let (status, body) = post_json(f.app.clone(), "/api/actions", update(42)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 1);
    assert_eq!(body["kind"], "record_update");

    let (status, body) = get(f.app.clone(), "/api/sync/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"syncing": false, "pending": 1, "failed": 0}));
}

#[tokio::test]
async fn list_returns_replay_order() {
    let f = fixture();
    for id in [3, 1, 2] {
        post_json(f.app.clone(), "/api/actions", update(id)).await;
    }
    let (status, body) = get(f.app.clone(), "/api/actions").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, [1, 2, 3]);
    assert_eq!(body[0]["payload"]["record_id"], 3);
    assert_eq!(body[0]["status"], "pending");
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let f = fixture();
    let (status, _) = post_json(f.app.clone(), "/api/actions", json!({"kind": "teleport"})).await;
    assert!(status.is_client_error(), "got {status}");
}

#[tokio::test]
async fn manual_sync_drains_and_purge_clears_completed() {
    let f = fixture();
    post_json(f.app.clone(), "/api/actions", update(1)).await;
    post_json(f.app.clone(), "/api/actions", update(2)).await;

    let (status, report) = post_json(f.app.clone(), "/api/sync", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["attempted"], 2);
    assert_eq!(report["completed"], 2);
    assert_eq!(f.backend.calls.load(Ordering::SeqCst), 2);

    let (_, stats) = get(f.app.clone(), "/api/sync/stats").await;
    assert_eq!(stats["completed"], 2);
    assert_eq!(stats["pending"], 0);

    let (status, body) = delete(f.app.clone(), "/api/actions/completed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["purged"], 2);
    let (_, body) = get(f.app.clone(), "/api/actions").await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn exhausted_actions_can_be_purged() {
    let f = fixture();
    f.backend.failing.store(true, Ordering::SeqCst);
    post_json(f.app.clone(), "/api/actions", update(1)).await;

    for _ in 0..3 {
        let (_, report) = post_json(f.app.clone(), "/api/sync", json!({})).await;
        assert_eq!(report["failed"], 1);
    }
    let (_, eligible) = get(f.app.clone(), "/api/actions?eligible=true").await;
    assert_eq!(eligible, json!([]));
    let (_, stats) = get(f.app.clone(), "/api/sync/stats").await;
    assert_eq!(stats["failed"], 1);
    assert_eq!(stats["exhausted"], 1);

    let (_, body) = get(f.app.clone(), "/api/actions/1").await;
    assert_eq!(body["retry_count"], 3);
    assert!(body["last_error"].as_str().unwrap().contains("unavailable"));

    let (_, body) = delete(f.app.clone(), "/api/actions/exhausted").await;
    assert_eq!(body["purged"], 1);
    let (_, status) = get(f.app.clone(), "/api/sync/status").await;
    assert_eq!(status["failed"], 0);
}

#[tokio::test]
async fn discard_missing_action_is_404() {
    let f = fixture();
    let (status, body) = delete(f.app.clone(), "/api/actions/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));

    let (status, _) = get(f.app.clone(), "/api/actions/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discard_removes_pending_action() {
    let f = fixture();
    post_json(f.app.clone(), "/api/actions", update(5)).await;
    let (status, body) = delete(f.app.clone(), "/api/actions/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["record_id"], 5);
    let (_, status) = get(f.app.clone(), "/api/sync/status").await;
    assert_eq!(status["pending"], 0);
}

#[tokio::test]
async fn going_online_drains_in_background() {
    let f = fixture();
    post_json(f.app.clone(), "/api/actions", update(7)).await;

    let (_, body) = get(f.app.clone(), "/api/connectivity").await;
    assert_eq!(body, json!({"online": false}));

    let (status, body) = post_json(f.app.clone(), "/api/connectivity", json!({"online": true})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    for _ in 0..200 {
        if f.backend.calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(f.backend.calls.load(Ordering::SeqCst), 1);

    let (_, body) = post_json(f.app.clone(), "/api/connectivity", json!({"online": true})).await;
    assert_eq!(body["changed"], false);
}

#[tokio::test]
async fn events_endpoint_is_an_sse_stream() {
    let f = fixture();
    let req = axum::http::Request::builder()
        .uri("/api/sync/events")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = f.app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ct = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(ct.starts_with("text/event-stream"), "got {ct}");
}

#[tokio::test]
async fn status_snapshots_reach_event_subscribers() {
    let dir = TempDir::new().unwrap();
    let store = ActionStore::open(&dir.path().join("actions.redb"), 3).unwrap();
    let queue = Arc::new(OfflineQueue::start(store, Arc::new(StubBackend::default()), false).unwrap());
    let state = AppState::new(queue.clone());
    let mut rx = state.status_tx.subscribe();

    queue
        .queue_action(ActionPayload::delivery_update(1, Default::default()))
        .await
        .unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.pending, 1);
    assert!(!snapshot.syncing);
}
