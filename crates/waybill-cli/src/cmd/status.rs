use std::path::Path;

use waybill_core::status::SyncStatus;

use crate::output::print_json;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let store = super::open_store(root, &config)?;
    let stats = store.stats()?;
    // Nothing syncs while the CLI holds the store.
    let status = SyncStatus::from_stats(&stats, false);

    if json {
        return print_json(&serde_json::json!({ "status": status, "stats": stats }));
    }

    println!("pending:    {}", stats.pending);
    println!("failed:     {}", stats.failed);
    if stats.exhausted > 0 {
        println!(
            "  {} failed syncs gave up after {} attempts (see `waybill purge exhausted`)",
            stats.exhausted,
            store.retry_cap()
        );
    }
    println!("syncing:    {}", stats.syncing);
    println!("completed:  {}", stats.completed);
    Ok(())
}
