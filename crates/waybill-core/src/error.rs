use thiserror::Error;

use crate::action::{ActionId, ActionStatus};

#[derive(Debug, Error)]
pub enum WaybillError {
    #[error("not initialized: run 'waybill init'")]
    NotInitialized,

    #[error("action store error: {0}")]
    Store(String),

    #[error("action store schema version {found} is not supported (expected {expected})")]
    SchemaVersion { found: u64, expected: u64 },

    #[error("action not found: {0}")]
    ActionNotFound(ActionId),

    #[error("invalid transition for action {id}: {from} -> {to}")]
    InvalidTransition {
        id: ActionId,
        from: ActionStatus,
        to: ActionStatus,
    },

    #[error("action {0} is syncing and cannot be discarded")]
    ActionBusy(ActionId),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("sync lane is closed")]
    LaneClosed,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WaybillError {
    pub(crate) fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }
}

/// Failure talking to the hosted backend. Always recoverable from the
/// queue's point of view: the sync engine records it on the action.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, WaybillError>;
