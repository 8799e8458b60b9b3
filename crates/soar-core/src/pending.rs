//! Durable single-slot holder for the pending action.
//!
//! Layout:
//!   <pending_file>        : raw command text, mode 0700 (the approval stage may run it)
//!   <pending_file>.lock   : present only while a read-modify-write is in flight
//!
//! The artifact's existence alone means "a decision is outstanding". Priority
//! is re-derived from the text on every read; the creation time is the file's
//! modification time.

use crate::classifier::priority_of;
use crate::error::{Result, SoarError};
use crate::io::{self, FileLock};
use crate::paths;
use crate::proposal::CommandProposal;
use crate::types::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ARTIFACT_MODE: u32 = 0o700;

const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub command_text: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Written,
    Skipped,
}

// ---------------------------------------------------------------------------
// PendingStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl PendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = paths::lock_path(&path);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store `proposal` unless that would replace a higher-priority action.
    ///
    /// Empty store ⇒ always written. Occupied ⇒ written only when the new
    /// priority is at least the existing one; otherwise the existing action is
    /// left byte-for-byte untouched.
    pub fn try_write(&self, proposal: &CommandProposal) -> Result<WriteOutcome> {
        let command = proposal.command_text.trim();
        if command.is_empty() {
            return Err(SoarError::InvalidProposal("command text is empty".into()));
        }
        let incoming = priority_of(command);

        let _lock = self.lock()?;
        if let Some(existing) = self.read_unlocked()? {
            if incoming < existing.priority {
                tracing::info!(
                    existing = %existing.priority,
                    incoming = %incoming,
                    "pending action outranks proposal; skipping overwrite"
                );
                return Ok(WriteOutcome::Skipped);
            }
            tracing::info!(
                existing = %existing.priority,
                incoming = %incoming,
                "replacing pending action"
            );
        }
        io::atomic_write(&self.path, command.as_bytes(), Some(ARTIFACT_MODE))?;
        tracing::info!(priority = %incoming, path = %self.path.display(), "pending action written");
        Ok(WriteOutcome::Written)
    }

    pub fn read(&self) -> Result<Option<PendingAction>> {
        let _lock = self.lock()?;
        self.read_unlocked()
    }

    /// Remove the pending action. Clearing an empty store is a no-op.
    pub fn clear(&self) -> Result<()> {
        let _lock = self.lock()?;
        if io::remove_if_exists(&self.path)? {
            tracing::info!(path = %self.path.display(), "pending action cleared");
        }
        Ok(())
    }

    /// Remove the pending action only if it still holds `expected`.
    ///
    /// A proposal written while the operator was deciding is a different
    /// action and stays for its own review. Returns whether anything was removed.
    pub fn clear_if(&self, expected: &str) -> Result<bool> {
        let _lock = self.lock()?;
        let Some(current) = self.read_unlocked()? else {
            return Ok(false);
        };
        if current.command_text != expected.trim() {
            tracing::info!(
                decided = %expected.trim(),
                pending = %current.command_text,
                priority = %current.priority,
                "newer pending action kept"
            );
            return Ok(false);
        }
        let removed = io::remove_if_exists(&self.path)?;
        if removed {
            tracing::info!(path = %self.path.display(), "pending action cleared");
        }
        Ok(removed)
    }

    fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(&self.lock_path, LOCK_WAIT, LOCK_STALE_AFTER)
    }

    fn read_unlocked(&self) -> Result<Option<PendingAction>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let created_at = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let command_text = content.trim().to_string();
        Ok(Some(PendingAction {
            priority: priority_of(&command_text),
            command_text,
            created_at,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> PendingStore {
        PendingStore::new(dir.path().join("pending_fix.sh"))
    }

    fn proposal(cmd: &str) -> CommandProposal {
        CommandProposal {
            command_text: cmd.to_string(),
            derived_severity: Severity::Low,
        }
    }

    #[test]
    fn empty_store_reads_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).read().unwrap(), None);
    }

    #[test]
    fn write_to_empty_store() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert_eq!(
            s.try_write(&proposal("echo 'No action needed.'")).unwrap(),
            WriteOutcome::Written
        );
        let action = s.read().unwrap().unwrap();
        assert_eq!(action.command_text, "echo 'No action needed.'");
        assert_eq!(action.priority, Priority::Advisory);
    }

    #[test]
    fn advisory_cannot_replace_critical() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.try_write(&proposal("shun 198.51.100.9")).unwrap();
        let before = std::fs::read(s.path()).unwrap();

        let outcome = s.try_write(&proposal("echo 'No action needed.'")).unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(std::fs::read(s.path()).unwrap(), before);
        assert_eq!(s.read().unwrap().unwrap().command_text, "shun 198.51.100.9");
    }

    #[test]
    fn critical_replaces_advisory() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.try_write(&proposal("echo 'disk cleanup'")).unwrap();
        let outcome = s.try_write(&proposal("shun 203.0.113.5")).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        let action = s.read().unwrap().unwrap();
        assert_eq!(action.command_text, "shun 203.0.113.5");
        assert_eq!(action.priority, Priority::Critical);
    }

    #[test]
    fn equal_priority_replaces() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.try_write(&proposal("shun 203.0.113.5")).unwrap();
        assert_eq!(
            s.try_write(&proposal("shun 203.0.113.6")).unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(s.read().unwrap().unwrap().command_text, "shun 203.0.113.6");
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(matches!(
            s.try_write(&proposal("  \n")),
            Err(SoarError::InvalidProposal(_))
        ));
        assert_eq!(s.read().unwrap(), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.try_write(&proposal("shun 203.0.113.5")).unwrap();
        s.clear().unwrap();
        assert_eq!(s.read().unwrap(), None);
        s.clear().unwrap();
        assert!(!s.path().exists());
    }

    #[test]
    fn clear_if_only_removes_the_decided_action() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert!(!s.clear_if("echo advisory").unwrap());

        s.try_write(&proposal("echo advisory")).unwrap();
        s.try_write(&proposal("shun 203.0.113.77")).unwrap();
        assert!(!s.clear_if("echo advisory").unwrap());
        assert_eq!(s.read().unwrap().unwrap().command_text, "shun 203.0.113.77");

        assert!(s.clear_if("shun 203.0.113.77\n").unwrap());
        assert_eq!(s.read().unwrap(), None);
    }

    #[test]
    fn survives_a_new_store_instance() {
        let dir = TempDir::new().unwrap();
        store(&dir).try_write(&proposal("shun 203.0.113.5")).unwrap();
        let reopened = store(&dir).read().unwrap().unwrap();
        assert_eq!(reopened.command_text, "shun 203.0.113.5");
    }

    #[cfg(unix)]
    #[test]
    fn artifact_is_executable_by_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.try_write(&proposal("echo hi")).unwrap();
        let mode = std::fs::metadata(s.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, ARTIFACT_MODE);
    }

    #[test]
    fn lock_is_released_after_each_operation() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.try_write(&proposal("echo hi")).unwrap();
        s.read().unwrap();
        assert!(!paths::lock_path(s.path()).exists());
    }

    #[test]
    fn concurrent_writes_keep_the_critical_action() {
        let dir = TempDir::new().unwrap();
        let s = Arc::new(store(&dir));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    let cmd = if i == 7 {
                        "shun 203.0.113.5".to_string()
                    } else {
                        format!("echo 'advisory {i}'")
                    };
                    s.try_write(&proposal(&cmd)).unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let action = s.read().unwrap().unwrap();
        assert_eq!(action.command_text, "shun 203.0.113.5");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "only the artifact remains: {leftovers:?}");
    }
}
