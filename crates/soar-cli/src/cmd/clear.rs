use crate::output::print_json;
use crate::settings;
use soar_core::pending::PendingStore;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = settings::load(config_path)?;
    let store = PendingStore::new(&config.pending_file);
    let had_pending = store.read()?.is_some();
    store.clear()?;

    if json {
        print_json(&serde_json::json!({ "cleared": had_pending }))?;
    } else if had_pending {
        println!("Pending action discarded.");
    } else {
        println!("No pending action.");
    }
    Ok(())
}
