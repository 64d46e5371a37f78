//! Persistent storage for queued actions using redb.
//!
//! # Table design
//!
//! Actions live in an arena keyed by their store-assigned id:
//! ```text
//! ACTIONS:      id: u64                                  -> JSON-encoded Action
//! BY_TIMESTAMP: [ secs: i64 BE, sign-flipped | nanos: u32 BE | id: u64 BE ] -> id
//! META:         "schema_version" | "next_id"             -> u64
//! ```
//!
//! Replay order comes from `BY_TIMESTAMP`, never from arena iteration.
//! Flipping the sign bit of the seconds maps `i64` order onto unsigned byte
//! order, so pre-epoch times sort correctly. With the sub-second nanos next,
//! byte ordering equals timestamp ordering at full clock precision, and the
//! id suffix breaks exact ties in insertion order.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{Action, ActionId, ActionPayload, ActionStatus};
use crate::error::{Result, WaybillError};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const ACTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("actions");
const BY_TIMESTAMP: TableDefinition<&[u8], u64> = TableDefinition::new("actions_by_timestamp");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";
const NEXT_ID_KEY: &str = "next_id";

/// Bumped whenever the on-disk layout changes incompatibly.
pub const SCHEMA_VERSION: u64 = 1;

const INTERRUPTED_REASON: &str = "interrupted before completion";

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn timestamp_key(ts: DateTime<Utc>, id: ActionId) -> [u8; 20] {
    let mut key = [0u8; 20];
    let secs = (ts.timestamp() as u64) ^ (1 << 63);
    key[..8].copy_from_slice(&secs.to_be_bytes());
    key[8..12].copy_from_slice(&ts.timestamp_subsec_nanos().to_be_bytes());
    key[12..].copy_from_slice(&id.0.to_be_bytes());
    key
}

fn encode(action: &Action) -> Result<Vec<u8>> {
    serde_json::to_vec(action).map_err(WaybillError::store)
}

fn decode(bytes: &[u8]) -> Result<Action> {
    serde_json::from_slice(bytes).map_err(WaybillError::store)
}

// ---------------------------------------------------------------------------
// SyncStats
// ---------------------------------------------------------------------------

/// Per-status totals across the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub pending: u64,
    pub syncing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Subset of `failed` that reached the retry cap.
    pub exhausted: u64,
}

// ---------------------------------------------------------------------------
// ActionStore
// ---------------------------------------------------------------------------

/// Durable store for queued `Action` records.
pub struct ActionStore {
    db: Database,
    retry_cap: u32,
}

impl ActionStore {
    /// Open or create the redb database at `path`.
    ///
    /// Creates all tables, stamps a fresh database with `SCHEMA_VERSION` and
    /// refuses to open a database written with a different version.
    pub fn open(path: &Path, retry_cap: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(WaybillError::store)?;
        let wt = db.begin_write().map_err(WaybillError::store)?;
        {
            wt.open_table(ACTIONS).map_err(WaybillError::store)?;
            wt.open_table(BY_TIMESTAMP).map_err(WaybillError::store)?;
            let mut meta = wt.open_table(META).map_err(WaybillError::store)?;
            let found = meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(WaybillError::store)?
                .map(|v| v.value());
            match found {
                None => {
                    meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)
                        .map_err(WaybillError::store)?;
                }
                Some(v) if v == SCHEMA_VERSION => {}
                Some(v) => {
                    return Err(WaybillError::SchemaVersion {
                        found: v,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
        }
        wt.commit().map_err(WaybillError::store)?;
        debug!(path = %path.display(), retry_cap, "opened action store");
        Ok(Self { db, retry_cap })
    }

    pub fn retry_cap(&self) -> u32 {
        self.retry_cap
    }

    /// Persist a new `Pending` action stamped with the current time.
    pub fn enqueue(&self, payload: ActionPayload) -> Result<ActionId> {
        self.enqueue_at(payload, Utc::now())
    }

    /// Persist a new `Pending` action with an explicit creation time, e.g.
    /// one captured by the caller before it could reach the store.
    pub fn enqueue_at(&self, payload: ActionPayload, timestamp: DateTime<Utc>) -> Result<ActionId> {
        let kind = payload.kind();
        let wt = self.db.begin_write().map_err(WaybillError::store)?;
        let id = {
            let mut meta = wt.open_table(META).map_err(WaybillError::store)?;
            let next = meta
                .get(NEXT_ID_KEY)
                .map_err(WaybillError::store)?
                .map(|v| v.value())
                .unwrap_or(1);
            meta.insert(NEXT_ID_KEY, next + 1)
                .map_err(WaybillError::store)?;
            ActionId(next)
        };
        let action = Action::new(id, payload, timestamp);
        let value = encode(&action)?;
        {
            let mut actions = wt.open_table(ACTIONS).map_err(WaybillError::store)?;
            actions
                .insert(id.0, value.as_slice())
                .map_err(WaybillError::store)?;
            let mut index = wt.open_table(BY_TIMESTAMP).map_err(WaybillError::store)?;
            let key = timestamp_key(timestamp, id);
            index
                .insert(key.as_slice(), id.0)
                .map_err(WaybillError::store)?;
        }
        wt.commit().map_err(WaybillError::store)?;
        debug!(action_id = %id, kind = %kind, "queued action");
        Ok(id)
    }

    pub fn get(&self, id: ActionId) -> Result<Option<Action>> {
        let rt = self.db.begin_read().map_err(WaybillError::store)?;
        let actions = rt.open_table(ACTIONS).map_err(WaybillError::store)?;
        let found = actions.get(id.0).map_err(WaybillError::store)?;
        found.map(|v| decode(v.value())).transpose()
    }

    /// All actions in replay order (ascending timestamp, then id).
    pub fn list_all(&self) -> Result<Vec<Action>> {
        self.scan_ordered(|_| true)
    }

    /// Actions a drain cycle may pick up, in replay order.
    ///
    /// `Pending` or `Failed` with `retry_count` below the cap. Later
    /// mutations on the same record must never overtake earlier ones, so
    /// the order is part of the contract.
    pub fn list_eligible(&self) -> Result<Vec<Action>> {
        let cap = self.retry_cap;
        self.scan_ordered(|a| a.is_eligible(cap))
    }

    fn scan_ordered(&self, keep: impl Fn(&Action) -> bool) -> Result<Vec<Action>> {
        let rt = self.db.begin_read().map_err(WaybillError::store)?;
        let index = rt.open_table(BY_TIMESTAMP).map_err(WaybillError::store)?;
        let actions = rt.open_table(ACTIONS).map_err(WaybillError::store)?;

        let mut result = Vec::new();
        for entry in index.iter().map_err(WaybillError::store)? {
            let (_, id) = entry.map_err(WaybillError::store)?;
            let id = id.value();
            let Some(raw) = actions.get(id).map_err(WaybillError::store)? else {
                warn!(action_id = id, "timestamp index points at a missing action");
                continue;
            };
            let action = decode(raw.value())?;
            if keep(&action) {
                result.push(action);
            }
        }
        Ok(result)
    }

    /// Move an action to `status`, adding `retry_delta` to its retry count.
    ///
    /// Runs in a single write transaction. Rejects transitions that would
    /// skip `Syncing` or leave a terminal `Completed`.
    pub fn update_status(&self, id: ActionId, status: ActionStatus, retry_delta: u32) -> Result<Action> {
        self.modify(id, |action| {
            transition(action, status)?;
            action.retry_count = action.retry_count.saturating_add(retry_delta);
            if status == ActionStatus::Completed {
                action.last_error = None;
            }
            Ok(())
        })
    }

    /// Record a failed attempt: `Syncing → Failed`, one more retry, and the
    /// reason kept for inspection.
    pub fn mark_failed(&self, id: ActionId, reason: &str) -> Result<Action> {
        self.modify(id, |action| {
            transition(action, ActionStatus::Failed)?;
            action.retry_count = action.retry_count.saturating_add(1);
            action.last_error = Some(reason.to_string());
            Ok(())
        })
    }

    fn modify(&self, id: ActionId, f: impl FnOnce(&mut Action) -> Result<()>) -> Result<Action> {
        let wt = self.db.begin_write().map_err(WaybillError::store)?;
        let action = {
            let mut actions = wt.open_table(ACTIONS).map_err(WaybillError::store)?;
            let raw = actions
                .get(id.0)
                .map_err(WaybillError::store)?
                .map(|v| v.value().to_vec())
                .ok_or(WaybillError::ActionNotFound(id))?;
            let mut action = decode(&raw)?;
            f(&mut action)?;
            action.updated_at = Utc::now();
            let value = encode(&action)?;
            actions
                .insert(id.0, value.as_slice())
                .map_err(WaybillError::store)?;
            action
        };
        wt.commit().map_err(WaybillError::store)?;
        debug!(
            action_id = %id,
            status = %action.status,
            retry_count = action.retry_count,
            "updated action"
        );
        Ok(action)
    }

    pub fn count_by_status(&self, status: ActionStatus) -> Result<u64> {
        let mut count = 0;
        self.for_each(|a| {
            if a.status == status {
                count += 1;
            }
        })?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<SyncStats> {
        let cap = self.retry_cap;
        let mut stats = SyncStats::default();
        self.for_each(|a| {
            match a.status {
                ActionStatus::Pending => stats.pending += 1,
                ActionStatus::Syncing => stats.syncing += 1,
                ActionStatus::Completed => stats.completed += 1,
                ActionStatus::Failed => stats.failed += 1,
            }
            if a.is_exhausted(cap) {
                stats.exhausted += 1;
            }
        })?;
        Ok(stats)
    }

    fn for_each(&self, mut f: impl FnMut(&Action)) -> Result<()> {
        let rt = self.db.begin_read().map_err(WaybillError::store)?;
        let actions = rt.open_table(ACTIONS).map_err(WaybillError::store)?;
        for entry in actions.iter().map_err(WaybillError::store)? {
            let (_, v) = entry.map_err(WaybillError::store)?;
            f(&decode(v.value())?);
        }
        Ok(())
    }

    /// Delete every `Completed` action. Returns how many were removed.
    pub fn purge_completed(&self) -> Result<u64> {
        let n = self.delete_where(|a| a.status == ActionStatus::Completed)?;
        info!(removed = n, "purged completed actions");
        Ok(n)
    }

    /// Delete every `Failed` action that has run out of attempts.
    pub fn purge_exhausted(&self) -> Result<u64> {
        let cap = self.retry_cap;
        let n = self.delete_where(|a| a.is_exhausted(cap))?;
        info!(removed = n, "purged exhausted actions");
        Ok(n)
    }

    /// Delete one action. An action that is mid-execution cannot be removed.
    pub fn discard(&self, id: ActionId) -> Result<Action> {
        let wt = self.db.begin_write().map_err(WaybillError::store)?;
        let action = {
            let mut actions = wt.open_table(ACTIONS).map_err(WaybillError::store)?;
            let raw = actions
                .get(id.0)
                .map_err(WaybillError::store)?
                .map(|v| v.value().to_vec())
                .ok_or(WaybillError::ActionNotFound(id))?;
            let action = decode(&raw)?;
            if action.status == ActionStatus::Syncing {
                return Err(WaybillError::ActionBusy(id));
            }
            actions.remove(id.0).map_err(WaybillError::store)?;
            action
        };
        remove_index_entries(&wt, &[(action.timestamp, id)])?;
        wt.commit().map_err(WaybillError::store)?;
        info!(action_id = %id, status = %action.status, "discarded action");
        Ok(action)
    }

    fn delete_where(&self, matches: impl Fn(&Action) -> bool) -> Result<u64> {
        let wt = self.db.begin_write().map_err(WaybillError::store)?;
        let doomed = {
            let mut actions = wt.open_table(ACTIONS).map_err(WaybillError::store)?;
            let mut doomed = Vec::new();
            for entry in actions.iter().map_err(WaybillError::store)? {
                let (_, v) = entry.map_err(WaybillError::store)?;
                let action = decode(v.value())?;
                if matches(&action) {
                    doomed.push((action.timestamp, action.id));
                }
            }
            for (_, id) in &doomed {
                actions.remove(id.0).map_err(WaybillError::store)?;
            }
            doomed
        };
        remove_index_entries(&wt, &doomed)?;
        wt.commit().map_err(WaybillError::store)?;
        Ok(doomed.len() as u64)
    }

    /// On startup, move every action left in `Syncing` by a crash to
    /// `Failed`, counting the interrupted attempt.
    ///
    /// Returns the number of actions recovered.
    pub fn recover_interrupted(&self) -> Result<u32> {
        let wt = self.db.begin_write().map_err(WaybillError::store)?;
        let mut count = 0u32;
        {
            let mut actions = wt.open_table(ACTIONS).map_err(WaybillError::store)?;
            let mut stuck = Vec::new();
            for entry in actions.iter().map_err(WaybillError::store)? {
                let (_, v) = entry.map_err(WaybillError::store)?;
                let action = decode(v.value())?;
                if action.status == ActionStatus::Syncing {
                    stuck.push(action);
                }
            }
            let now = Utc::now();
            for mut action in stuck {
                action.status = ActionStatus::Failed;
                action.retry_count = action.retry_count.saturating_add(1);
                action.last_error = Some(INTERRUPTED_REASON.to_string());
                action.updated_at = now;
                let value = encode(&action)?;
                actions
                    .insert(action.id.0, value.as_slice())
                    .map_err(WaybillError::store)?;
                warn!(action_id = %action.id, "recovered interrupted action");
                count += 1;
            }
        }
        wt.commit().map_err(WaybillError::store)?;
        Ok(count)
    }
}

fn transition(action: &mut Action, next: ActionStatus) -> Result<()> {
    if !action.status.can_transition_to(next) {
        return Err(WaybillError::InvalidTransition {
            id: action.id,
            from: action.status,
            to: next,
        });
    }
    action.status = next;
    Ok(())
}

/// Run a store operation on the blocking pool so redb commits never stall
/// the async runtime.
pub async fn run_blocking<T, F>(store: &Arc<ActionStore>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ActionStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| WaybillError::Store(format!("store task join error: {e}")))?
}

fn remove_index_entries(wt: &WriteTransaction, entries: &[(DateTime<Utc>, ActionId)]) -> Result<()> {
    let mut index = wt.open_table(BY_TIMESTAMP).map_err(WaybillError::store)?;
    for (ts, id) in entries {
        let key = timestamp_key(*ts, *id);
        index.remove(key.as_slice()).map_err(WaybillError::store)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
