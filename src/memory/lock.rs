//! Advisory lock file guarding the memory file across processes.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::error::{Error, Result};

/// A lock older than this is considered abandoned.
const STALE_AFTER: Duration = Duration::from_millis(5000);

/// How long to wait on a live lock before giving up.
const WAIT_FOR: Duration = Duration::from_millis(2000);

const POLL_EVERY: Duration = Duration::from_millis(25);

static RECLAIMS: AtomicUsize = AtomicUsize::new(0);

/// Lock path for a memory file: `<file>.lock`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Acquire an exclusive lock next to `path`.
pub fn acquire_lock(path: &Path) -> Result<LockHandle> {
    let lock_path = lock_path_for(path);
    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
        }
    }

    let deadline = Instant::now() + WAIT_FOR;
    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())
                    .and_then(|()| file.sync_all())
                    .map_err(|e| Error::persistence(&lock_path, e))?;
                tracing::debug!("Acquired lock: {}", lock_path.display());
                return Ok(LockHandle { lock_path });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if is_stale(&lock_path) && reclaim_stale(&lock_path) {
                    continue;
                }
                if Instant::now() >= deadline {
                    return Err(Error::Locked(lock_path.display().to_string()));
                }
                std::thread::sleep(POLL_EVERY);
            }
            Err(e) => return Err(Error::persistence(&lock_path, e)),
        }
    }
}

fn is_stale(lock_path: &Path) -> bool {
    let Ok(modified) = lock_path.metadata().and_then(|m| m.modified()) else {
        // Vanished between open and stat; let the next attempt decide.
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= STALE_AFTER)
        .unwrap_or(false)
}

/// Move a stale lock out of the way. Returns true if a stale lock was
/// removed.
///
/// The rename is atomic, so when several processes race on the same stale
/// lock only one of them moves it. A racer that instead moves a lock
/// which was just re-created puts it back.
fn reclaim_stale(lock_path: &Path) -> bool {
    let mut aside = lock_path.as_os_str().to_owned();
    aside.push(format!(
        ".stale.{}.{}",
        std::process::id(),
        RECLAIMS.fetch_add(1, Ordering::Relaxed)
    ));
    let aside = PathBuf::from(aside);

    if std::fs::rename(lock_path, &aside).is_err() {
        // Someone else got there first.
        return false;
    }

    if is_stale(&aside) {
        tracing::warn!("Removed stale lock: {}", lock_path.display());
        std::fs::remove_file(&aside).ok();
        return true;
    }

    // Took a live lock; restore it without clobbering a newer one.
    if let Err(e) = std::fs::hard_link(&aside, lock_path) {
        tracing::warn!("Could not restore live lock {}: {}", lock_path.display(), e);
    }
    std::fs::remove_file(&aside).ok();
    false
}

/// Lock handle - releases lock when dropped.
#[derive(Debug)]
pub struct LockHandle {
    lock_path: PathBuf,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            tracing::warn!("Failed to release lock {}: {}", self.lock_path.display(), e);
        } else {
            tracing::debug!("Released lock: {}", self.lock_path.display());
        }
    }
}
