use crate::error::{Result, SoarError};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
///
/// On unix the file carries `mode` before it becomes visible under `path`,
/// so readers never observe the artifact with the wrong permissions.
pub fn atomic_write(path: &Path, data: &[u8], mode: Option<u32>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    if let Some(mode) = mode {
        set_mode(tmp.as_file(), mode)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> Result<()> {
    Ok(())
}

/// Remove a file, treating "already gone" as success. Returns true if removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// FileLock
// ---------------------------------------------------------------------------

/// Exclusive advisory lock held as long as the guard lives.
///
/// The lock file is created with `create_new`, so exactly one holder can
/// exist across processes. Lock files older than `stale_after` are assumed to
/// belong to a crashed holder and are broken.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

const LOCK_POLL: Duration = Duration::from_millis(10);

impl FileLock {
    pub fn acquire(path: &Path, wait: Duration, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let deadline = Instant::now() + wait;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "{}", std::process::id());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path, stale_after) {
                        tracing::warn!(lock = %path.display(), "breaking stale lock");
                        remove_if_exists(path)?;
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(SoarError::StoreLocked(path.display().to_string()));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > stale_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/pending.sh");
        atomic_write(&path, b"echo hi", None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "echo hi");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.sh");
        atomic_write(&path, b"shun 1.2.3.4", Some(0o700)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn remove_if_exists_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone");
        std::fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }

    #[test]
    fn second_lock_times_out_until_first_drops() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.lock");
        let first = FileLock::acquire(&path, Duration::ZERO, Duration::from_secs(60)).unwrap();
        let second = FileLock::acquire(&path, Duration::from_millis(30), Duration::from_secs(60));
        assert!(matches!(second, Err(SoarError::StoreLocked(_))));
        drop(first);
        assert!(!path.exists());
        FileLock::acquire(&path, Duration::ZERO, Duration::from_secs(60)).unwrap();
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.lock");
        std::fs::write(&path, b"12345\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let lock = FileLock::acquire(&path, Duration::ZERO, Duration::from_millis(5));
        assert!(lock.is_ok());
    }
}
