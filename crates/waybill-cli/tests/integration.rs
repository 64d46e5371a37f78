#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn waybill(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("waybill").unwrap();
    cmd.current_dir(dir.path())
        .env("WAYBILL_ROOT", dir.path())
        .env_remove("WAYBILL_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    waybill(dir)
        .args(["init", "--url", "http://127.0.0.1:1"])
        .assert()
        .success();
}

fn queue_update(dir: &TempDir, record: &str, status: &str) {
    waybill(dir)
        .args(["queue", "update", "--record", record, "--set"])
        .arg(format!("status={status}"))
        .assert()
        .success();
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// waybill init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_store() {
    let dir = TempDir::new().unwrap();
    waybill(&dir)
        .args(["init", "--url", "https://example.supabase.co"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .waybill/config.yaml"));

    assert!(dir.path().join(".waybill/config.yaml").exists());
    assert!(dir.path().join(".waybill/actions.redb").exists());
    let config = std::fs::read_to_string(dir.path().join(".waybill/config.yaml")).unwrap();
    assert!(config.contains("https://example.supabase.co"));
    assert!(config.contains("retry_cap: 3"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    waybill(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .waybill/config.yaml"));
}

#[test]
fn init_reports_missing_backend_url() {
    let dir = TempDir::new().unwrap();
    waybill(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("backend.url is not set"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    waybill(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// waybill queue / list / status
// ---------------------------------------------------------------------------

#[test]
fn queued_actions_list_in_replay_order() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    queue_update(&dir, "42", "IN_PROGRESS");
    queue_update(&dir, "42", "COMPLETED");

    let list = json_output(waybill(&dir).args(["list", "--json"]));
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], 1);
    assert_eq!(list[0]["payload"]["fields"]["status"], "IN_PROGRESS");
    assert_eq!(list[1]["payload"]["fields"]["status"], "COMPLETED");
    assert_eq!(list[1]["payload"]["collection"], "deliveries");
    assert_eq!(list[1]["status"], "pending");
}

#[test]
fn queue_json_reports_id_and_kind() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let out = json_output(waybill(&dir).args([
        "queue", "update", "--record", "7", "--set", "status=COMPLETED", "--json",
    ]));
    assert_eq!(out["id"], 1);
    assert_eq!(out["kind"], "record_update");
}

#[test]
fn photo_is_queued_from_file() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let photo = dir.path().join("dent.jpg");
    std::fs::write(&photo, [0xff, 0xd8, 0xff]).unwrap();

    waybill(&dir)
        .args(["queue", "photo", "--key", "damage-1.jpg", "--file"])
        .arg(&photo)
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued photo_upload action 1"));

    let list = json_output(waybill(&dir).args(["list", "--json"]));
    assert_eq!(list[0]["payload"]["kind"], "photo_upload");
    assert_eq!(list[0]["payload"]["file"], "/9j/");
}

#[test]
fn missing_upload_file_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    waybill(&dir)
        .args(["queue", "signature", "--delivery", "1", "--key", "s.png", "--file", "nope.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn status_counts_pending() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    queue_update(&dir, "1", "COMPLETED");
    queue_update(&dir, "2", "COMPLETED");

    let out = json_output(waybill(&dir).args(["status", "--json"]));
    assert_eq!(out["status"]["pending"], 2);
    assert_eq!(out["status"]["syncing"], false);
    assert_eq!(out["stats"]["failed"], 0);

    waybill(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("deliveries#2"));
}

// ---------------------------------------------------------------------------
// waybill sync / purge / discard
// ---------------------------------------------------------------------------

#[test]
fn sync_against_unreachable_backend_records_failures() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    queue_update(&dir, "1", "COMPLETED");

    let out = json_output(waybill(&dir).args(["sync", "--json"]));
    assert_eq!(out["report"]["attempted"], 1);
    assert_eq!(out["report"]["failed"], 1);
    assert_eq!(out["stats"]["failed"], 1);

    let list = json_output(waybill(&dir).args(["list", "--json"]));
    assert_eq!(list[0]["status"], "failed");
    assert_eq!(list[0]["retry_count"], 1);
    assert!(list[0]["last_error"].as_str().unwrap().contains("network error"));
}

#[test]
fn exhausted_actions_are_skipped_then_purged() {
    let dir = TempDir::new().unwrap();
    waybill(&dir)
        .args(["init", "--url", "http://127.0.0.1:1", "--retry-cap", "1"])
        .assert()
        .success();
    queue_update(&dir, "1", "COMPLETED");

    waybill(&dir).arg("sync").assert().success();
    let out = json_output(waybill(&dir).args(["sync", "--json"]));
    assert_eq!(out["report"]["attempted"], 0);

    let list = json_output(waybill(&dir).args(["list", "--eligible", "--json"]));
    assert_eq!(list, serde_json::json!([]));

    let out = json_output(waybill(&dir).args(["purge", "exhausted", "--json"]));
    assert_eq!(out["purged"], 1);
}

#[test]
fn sync_without_backend_url_fails() {
    let dir = TempDir::new().unwrap();
    waybill(&dir).arg("init").assert().success();
    waybill(&dir)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("backend.url"));
}

#[test]
fn purge_defaults_to_completed() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    queue_update(&dir, "1", "COMPLETED");
    waybill(&dir)
        .arg("purge")
        .assert()
        .success()
        .stdout(predicate::str::contains("Purged 0 completed action(s)"));
}

#[test]
fn discard_removes_action() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    queue_update(&dir, "9", "COMPLETED");

    waybill(&dir)
        .args(["discard", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deliveries#9"));
    waybill(&dir)
        .args(["discard", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("action not found: 1"));
}
