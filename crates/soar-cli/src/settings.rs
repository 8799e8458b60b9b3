use anyhow::Context;
use soar_core::config::{Config, Stage};
use std::path::Path;

/// Load the config and check it for `stage`. Fatal on any error-level finding.
pub fn load_for(path: &Path, stage: Stage) -> anyhow::Result<Config> {
    let config = load(path)?;
    config
        .ensure_valid(stage)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Load without stage checks; enough for commands that only touch the store.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}
