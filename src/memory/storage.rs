//! Storage handles the memory store persists through.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

use super::lock::{acquire_lock, LockHandle};

/// Durable home of the memory collection.
///
/// `write` must be all-or-nothing: after a failed write, `read` returns
/// what it returned before. `lock` is held across a full
/// load-modify-persist sequence.
pub trait Storage {
    type Guard;

    /// Full contents, or `None` if nothing has been persisted yet.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the full contents.
    fn write(&self, data: &[u8]) -> Result<()>;

    fn lock(&self) -> Result<Self::Guard>;

    /// Human-readable location for logs and messages.
    fn describe(&self) -> String;
}

/// Single text file on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}.tmp", std::process::id()));
        PathBuf::from(name)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
                tracing::debug!("Created memory directory: {}", parent.display());
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    type Guard = LockHandle;

    fn read(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persistence(&self.path, e)),
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.ensure_parent()?;

        // Write the sibling temp file fully, then swap it in.
        let tmp = self.temp_path();
        let written = std::fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(data)?;
                file.sync_all()
            })
            .and_then(|()| std::fs::rename(&tmp, &self.path));

        if let Err(e) = written {
            std::fs::remove_file(&tmp).ok();
            return Err(Error::persistence(&self.path, e));
        }

        tracing::debug!("Wrote {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }

    fn lock(&self) -> Result<LockHandle> {
        acquire_lock(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Buffer held in memory. Useful for tests and for embedding the store
/// without touching the filesystem.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    data: Option<Vec<u8>>,
    fail_writes: bool,
    writes: usize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing persisted bytes.
    pub fn with_contents(data: impl Into<Vec<u8>>) -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                data: Some(data.into()),
                ..InMemoryState::default()
            }),
        }
    }

    /// Make every subsequent write fail, leaving contents untouched.
    pub fn fail_writes(&self, fail: bool) {
        self.with_state(|s| s.fail_writes = fail);
    }

    /// Current persisted bytes.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.with_state(|s| s.data.clone())
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.with_state(|s| s.writes)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut InMemoryState) -> T) -> T {
        // A poisoned buffer is still a consistent buffer: writes swap it whole.
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Storage for InMemoryStorage {
    type Guard = ();

    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.with_state(|s| s.data.clone()))
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.with_state(|s| {
            if s.fail_writes {
                return Err(Error::persistence(
                    "<memory>",
                    std::io::Error::new(std::io::ErrorKind::Other, "write rejected"),
                ));
            }
            s.data = Some(data.to_vec());
            s.writes += 1;
            Ok(())
        })
    }

    fn lock(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
