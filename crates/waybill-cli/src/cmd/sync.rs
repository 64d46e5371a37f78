use std::path::Path;

use crate::output::print_json;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        // Offline so only the explicit drain below runs.
        let queue = super::start_queue(root, false)?;
        let report = queue.sync().await?;
        let stats = queue.stats().await?;
        queue.shutdown().await;

        if json {
            print_json(&serde_json::json!({ "report": report, "stats": stats }))?;
        } else {
            println!(
                "Synced {} of {} action(s); {} failed",
                report.completed, report.attempted, report.failed
            );
            if report.exhausted > 0 {
                println!("  {} action(s) reached the retry cap", report.exhausted);
            }
            println!("pending: {}  failed: {}", stats.pending, stats.failed);
        }
        anyhow::Ok(())
    })
}
