use clap::ValueEnum;
use std::path::Path;

use crate::output::print_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PurgeTarget {
    /// Actions that synced successfully
    Completed,
    /// Failed actions that reached the retry cap
    Exhausted,
}

pub fn run(root: &Path, target: PurgeTarget, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let store = super::open_store(root, &config)?;
    let (purged, label) = match target {
        PurgeTarget::Completed => (store.purge_completed()?, "completed"),
        PurgeTarget::Exhausted => (store.purge_exhausted()?, "exhausted"),
    };

    if json {
        print_json(&serde_json::json!({ "purged": purged, "target": label }))?;
    } else {
        println!("Purged {purged} {label} action(s)");
    }
    Ok(())
}
