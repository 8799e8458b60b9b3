use crate::output::{print_fields, print_json};
use soar_core::classifier::{classify, priority_of};

pub fn run(text: &str, json: bool) -> anyhow::Result<()> {
    let backend = classify(text);
    let priority = priority_of(text);

    if json {
        return print_json(&serde_json::json!({
            "command": text,
            "backend": backend,
            "target": backend.label(),
            "priority": priority,
        }));
    }

    print_fields(&[
        ("Backend", backend.to_string()),
        ("Target", backend.label().to_string()),
        ("Priority", priority.to_string()),
    ]);
    Ok(())
}
