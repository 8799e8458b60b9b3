use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_FILE: &str = "/etc/soar/config.yaml";
pub const DEFAULT_PENDING_FILE: &str = "/var/lib/soar/pending_fix.sh";

/// Environment variable the CLI reads as a fallback for `--config`.
pub const CONFIG_ENV: &str = "SOAR_CONFIG";

const LOCK_SUFFIX: &str = "lock";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve the config file location.
///
/// Priority:
/// 1. `--config` flag / `SOAR_CONFIG` env var (passed in as `explicit`)
/// 2. [`DEFAULT_CONFIG_FILE`]
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Sibling lock file guarding read-modify-write on the pending artifact.
pub fn lock_path(pending_file: &Path) -> PathBuf {
    let mut name = pending_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(LOCK_SUFFIX);
    pending_file.with_file_name(name)
}
