//! Turns one queued action into the backend calls that apply it.
//!
//! The executor never retries on its own. A failure at any step is returned
//! for the whole action and the sync engine decides what happens next.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::action::{Action, ActionPayload, Blob, Fields};
use crate::config::TargetsConfig;
use crate::error::BackendError;

pub const SIGNATURE_CONTENT_TYPE: &str = "image/png";
pub const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Targeted record writes on the hosted backend.
#[async_trait]
pub trait RecordApi: Send + Sync {
    /// Set `fields` on the record `id` of `collection`.
    async fn update(&self, collection: &str, id: i64, fields: &Fields) -> Result<(), BackendError>;
}

/// Blob uploads on the hosted backend.
///
/// Implementations must overwrite an existing object at the same key, so
/// replaying an upload is harmless.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: &Blob,
    ) -> Result<(), BackendError>;
}

/// Anything that can carry a payload to the backend.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Apply a payload, with or without a stored action around it.
    async fn apply(&self, payload: &ActionPayload) -> Result<(), BackendError>;

    async fn execute(&self, action: &Action) -> Result<(), BackendError> {
        debug!(action_id = %action.id, kind = %action.kind(), "executing action");
        self.apply(&action.payload).await
    }
}

pub struct ActionExecutor {
    records: Arc<dyn RecordApi>,
    storage: Arc<dyn ObjectStorage>,
    targets: TargetsConfig,
}

impl ActionExecutor {
    pub fn new(records: Arc<dyn RecordApi>, storage: Arc<dyn ObjectStorage>, targets: TargetsConfig) -> Self {
        Self {
            records,
            storage,
            targets,
        }
    }
}

#[async_trait]
impl Executor for ActionExecutor {
    async fn apply(&self, payload: &ActionPayload) -> Result<(), BackendError> {
        match payload {
            ActionPayload::RecordUpdate {
                collection,
                record_id,
                fields,
            } => self.records.update(collection, *record_id, fields).await,

            ActionPayload::SignatureUpload {
                delivery_id,
                object_key,
                file,
            } => {
                self.storage
                    .upload(&self.targets.signature_bucket, object_key, SIGNATURE_CONTENT_TYPE, file)
                    .await?;
                let mut fields = Fields::new();
                fields.insert("signature_url".into(), Value::String(object_key.clone()));
                self.records
                    .update(&self.targets.deliveries, *delivery_id, &fields)
                    .await
            }

            ActionPayload::PhotoUpload { object_key, file } => {
                self.storage
                    .upload(&self.targets.photo_bucket, object_key, PHOTO_CONTENT_TYPE, file)
                    .await
            }
        }
    }
}
