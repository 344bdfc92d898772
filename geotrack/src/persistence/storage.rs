//! Keyed byte storage for checkpoints.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Private, process-scoped byte storage addressed by fixed key names.
pub trait ByteStore: Send + Sync {
    /// Read the bytes stored under `key`, `None` if nothing was stored.
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Stores each key as a file in one private directory.
///
/// Writes go to `<key>.tmp` first and are renamed over the target, so a
/// crash mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `directory`. The directory is created on the
    /// first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.ends_with(".tmp");
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key '{}'", key),
            ));
        }
        Ok(self.directory.join(key))
    }

    fn ensure_directory(&self) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.directory, fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}

impl ByteStore for FileStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key)?;
        self.ensure_directory()?;

        let tmp_path = self.directory.join(format!("{}.tmp", key));
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &path)
    }
}

/// In-memory store.
///
/// Useful for embedding and tests; [`set_fail_writes`](Self::set_fail_writes)
/// simulates a full or read-only medium.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw bytes under `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    /// Overwrite `key` with raw bytes, bypassing any failure switch.
    pub fn put(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.entries.lock().insert(key.to_string(), bytes.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl ByteStore for MemoryStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("memory store is read-only"));
        }
        self.put(key, bytes);
        Ok(())
    }
}
