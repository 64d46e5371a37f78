use std::path::Path;

use crate::output::{print_json, print_table, truncate};

pub fn run(root: &Path, eligible: bool, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let store = super::open_store(root, &config)?;
    let actions = if eligible {
        store.list_eligible()?
    } else {
        store.list_all()?
    };

    if json {
        return print_json(&actions);
    }
    if actions.is_empty() {
        println!("No actions.");
        return Ok(());
    }

    let cap = store.retry_cap();
    let rows = actions
        .iter()
        .map(|a| {
            let status = if a.is_exhausted(cap) {
                format!("{} (exhausted)", a.status)
            } else {
                a.status.to_string()
            };
            vec![
                a.id.to_string(),
                a.kind().to_string(),
                status,
                format!("{}/{cap}", a.retry_count),
                a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                super::target_label(&a.payload),
                truncate(a.last_error.as_deref().unwrap_or("-"), 40),
            ]
        })
        .collect();
    print_table(
        &["ID", "KIND", "STATUS", "TRIES", "CREATED", "TARGET", "LAST ERROR"],
        rows,
    );
    Ok(())
}
