//! Action data model for the offline queue.
//!
//! An `Action` is one deferred mutation against the hosted backend: what to
//! change (`ActionPayload`) plus the bookkeeping the sync engine needs to
//! replay it in order with a bounded number of attempts.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Failed attempts after which an action is never replayed again.
pub const DEFAULT_RETRY_CAP: u32 = 3;

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Store-assigned identifier, increasing in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action.
///
/// Transitions: `Pending | Failed → Syncing → Completed | Failed`
///
/// The sync engine writes `Syncing` *before* calling the executor. An action
/// found in `Syncing` on startup was interrupted and is recovered to `Failed`
/// by `ActionStore::recover_interrupted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Syncing,
    Completed,
    Failed,
}

impl ActionStatus {
    pub const ALL: [ActionStatus; 4] = [
        ActionStatus::Pending,
        ActionStatus::Syncing,
        ActionStatus::Completed,
        ActionStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Syncing)
                | (Self::Failed, Self::Syncing)
                | (Self::Syncing, Self::Completed)
                | (Self::Syncing, Self::Failed)
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionKind / ActionPayload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RecordUpdate,
    SignatureUpload,
    PhotoUpload,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecordUpdate => "record_update",
            Self::SignatureUpload => "signature_upload",
            Self::PhotoUpload => "photo_upload",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field values for a targeted record update.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// What an action does. The variant is the action's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Update `fields` on one record of `collection`.
    RecordUpdate {
        collection: String,
        record_id: i64,
        fields: Fields,
    },
    /// Upload a signature image, then point the delivery at it.
    SignatureUpload {
        delivery_id: i64,
        object_key: String,
        file: Blob,
    },
    /// Upload a damage photo.
    PhotoUpload { object_key: String, file: Blob },
}

impl ActionPayload {
    /// Convenience for the most common mutation: a delivery status change.
    pub fn delivery_update(delivery_id: i64, fields: Fields) -> Self {
        Self::RecordUpdate {
            collection: "deliveries".to_string(),
            record_id: delivery_id,
            fields,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::RecordUpdate { .. } => ActionKind::RecordUpdate,
            Self::SignatureUpload { .. } => ActionKind::SignatureUpload,
            Self::PhotoUpload { .. } => ActionKind::PhotoUpload,
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Binary file carried in a payload; base64 on disk and on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Blob)
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub payload: ActionPayload,
    /// Client clock at creation; the replay ordering key.
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub status: ActionStatus,
    /// Message from the most recent failed attempt.
    #[serde(default)]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Action {
    /// A fresh `Pending` action with no attempts.
    pub fn new(id: ActionId, payload: ActionPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            timestamp,
            retry_count: 0,
            status: ActionStatus::Pending,
            last_error: None,
            updated_at: timestamp,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    /// Whether a drain cycle may pick this action up.
    pub fn is_eligible(&self, retry_cap: u32) -> bool {
        matches!(self.status, ActionStatus::Pending | ActionStatus::Failed)
            && self.retry_count < retry_cap
    }

    /// Failed and out of attempts: kept as evidence, never replayed.
    pub fn is_exhausted(&self, retry_cap: u32) -> bool {
        self.status == ActionStatus::Failed && self.retry_count >= retry_cap
    }
}
