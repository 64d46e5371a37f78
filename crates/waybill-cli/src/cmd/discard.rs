use std::path::Path;
use waybill_core::action::ActionId;

use crate::output::print_json;

pub fn run(root: &Path, id: u64, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let store = super::open_store(root, &config)?;
    let action = store.discard(ActionId(id))?;

    if json {
        print_json(&action)?;
    } else {
        println!(
            "Discarded {} action {} ({})",
            action.kind(),
            action.id,
            super::target_label(&action.payload)
        );
    }
    Ok(())
}
