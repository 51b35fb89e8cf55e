/*!
Storage adapters for snapshot persistence.

The writer only talks to the filesystem through [`StorageAdapter`], so the
validation and backup logic can be exercised against an in-memory store or a
store that fails on demand.
*/

pub mod local;

use std::path::{Path, PathBuf};

use crate::Result;

/// Storage abstraction for reading, writing and archiving snapshot files.
#[cfg_attr(test, mockall::automock)]
pub trait StorageAdapter {
    /// Read the file at `path`
    ///
    /// # Returns
    /// `None` if nothing exists at `path`, the file bytes otherwise
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Replace the file at `path` with `data` in a single step
    ///
    /// Parent directories are created as needed. Implementations must never
    /// leave a partially written file in place of the previous content.
    ///
    /// # Errors
    /// * `StoreError::IoFailure` - if the data could not be written
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Copy the file at `from` to `to`, creating `to`'s parent directory
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Check if a file exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// List the files directly inside `dir`
    ///
    /// A missing directory yields an empty list.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Remove the file at `path`; removing a missing file is not an error
    fn remove(&self, path: &Path) -> Result<()>;
}

pub use local::LocalFileStorage;

/// Memory-based storage adapter for testing
///
/// Keeps files in a map keyed by path. Useful for unit testing without
/// touching the filesystem.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
    files: std::sync::Mutex<std::collections::BTreeMap<PathBuf, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), data.into());
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
impl StorageAdapter for MemoryStorage {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.get(path))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.insert(path, data);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self
            .get(from)
            .ok_or_else(|| crate::StoreError::storage(format!("no file at {}", from.display())))?;
        self.insert(to, data);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}
