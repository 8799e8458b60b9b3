use crate::output::print_json;
use crate::settings;
use clap::Subcommand;
use soar_core::config::{ConfigWarning, Stage, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for both pipeline stages
    Check,
}

pub fn run(config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(config_path, json),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = settings::load(config_path)?;
    let propose = config.validate(Stage::Propose { manual: false });
    let approve = config.validate(Stage::Approve);

    if json {
        print_json(&serde_json::json!({
            "path": config_path,
            "propose": propose,
            "approve": approve,
        }))?;
    } else {
        print_findings("propose", &propose);
        print_findings("approve", &approve);
    }

    let has_errors = propose
        .iter()
        .chain(&approve)
        .any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn print_findings(stage: &str, findings: &[ConfigWarning]) {
    if findings.is_empty() {
        println!("{stage}: ok");
        return;
    }
    for w in findings {
        let prefix = match w.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        println!("{stage}: [{prefix}] {}", w.message);
    }
}
