use crate::output::{print_fields, print_json};
use crate::settings;
use soar_core::classifier::classify;
use soar_core::pending::PendingStore;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = settings::load(config_path)?;
    let store = PendingStore::new(&config.pending_file);
    let pending = store.read()?;

    if json {
        let value = match &pending {
            Some(action) => serde_json::json!({
                "pending": true,
                "action": action,
                "backend": classify(&action.command_text),
            }),
            None => serde_json::json!({ "pending": false }),
        };
        return print_json(&value);
    }

    match pending {
        None => println!("No pending action."),
        Some(action) => {
            let backend = classify(&action.command_text);
            print_fields(&[
                ("Command", action.command_text.clone()),
                ("Priority", action.priority.to_string()),
                ("Target", format!("{} ({backend})", backend.label())),
                (
                    "Created",
                    action.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                ),
            ]);
        }
    }
    Ok(())
}
