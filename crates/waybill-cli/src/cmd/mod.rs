pub mod discard;
pub mod init;
pub mod list;
pub mod purge;
pub mod queue;
pub mod serve;
pub mod status;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use waybill_core::action::ActionPayload;
use waybill_core::config::{Config, WarnLevel};
use waybill_core::paths;
use waybill_core::queue::OfflineQueue;
use waybill_core::store::ActionStore;

pub(crate) fn load_config(root: &Path) -> anyhow::Result<Config> {
    Ok(Config::load(root)?)
}

/// Open the action store. redb holds an exclusive lock, so this fails while
/// `waybill serve` is running against the same root.
pub(crate) fn open_store(root: &Path, config: &Config) -> anyhow::Result<ActionStore> {
    let path = paths::database_path(root);
    ActionStore::open(&path, config.sync.retry_cap)
        .with_context(|| format!("failed to open action store {}", path.display()))
}

/// Config errors stop commands that talk to the backend; warnings are logged.
pub(crate) fn check_config(config: &Config) -> anyhow::Result<()> {
    for w in config.validate() {
        match w.level {
            WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
            WarnLevel::Warning => tracing::warn!("{}", w.message),
        }
    }
    Ok(())
}

/// Load config, open the store and start the queue against the real
/// backend. Must run inside a tokio runtime.
pub(crate) fn start_queue(root: &Path, online: bool) -> anyhow::Result<OfflineQueue> {
    let config = load_config(root)?;
    check_config(&config)?;
    let executor = waybill_remote::executor(&config)?;
    let store = open_store(root, &config)?;
    Ok(OfflineQueue::start(store, Arc::new(executor), online)?)
}

/// Short human description of what an action touches.
pub(crate) fn target_label(payload: &ActionPayload) -> String {
    match payload {
        ActionPayload::RecordUpdate {
            collection,
            record_id,
            ..
        } => format!("{collection}#{record_id}"),
        ActionPayload::SignatureUpload {
            delivery_id,
            object_key,
            ..
        } => format!("{object_key} -> delivery#{delivery_id}"),
        ActionPayload::PhotoUpload { object_key, .. } => object_key.clone(),
    }
}
