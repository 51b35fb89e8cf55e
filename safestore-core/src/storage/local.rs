/*!
Local filesystem storage adapter implementation.
*/

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::StorageAdapter;
use crate::{Result, StoreError};

/// Local filesystem storage adapter
///
/// Snapshots are written through a temporary file in the target directory
/// which is fsynced and then renamed over the destination, so readers only
/// ever see the old content or the new content.
///
/// # Example
/// ```rust,no_run
/// use std::path::Path;
/// use safestore_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let storage = LocalFileStorage::with_base_dir("public");
/// storage.write_atomic(Path::new("vuelos.json"), b"[]")?;
/// # Ok::<(), safestore_core::StoreError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage {
    /// Optional base directory relative paths are resolved against
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Create a storage adapter that uses paths as given
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a storage adapter resolving relative paths against `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    /// Resolve the full path for a given storage path
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn parent_dir(path: &Path) -> &Path {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn write_via_temp(full_path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = Self::parent_dir(full_path);
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".safestore-")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;

        // Temp files are created owner-only; keep the snapshot's existing mode.
        match fs::metadata(full_path) {
            Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
            Err(_) => set_default_permissions(tmp.as_file())?,
        }

        tmp.persist(full_path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_default_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

impl StorageAdapter for LocalFileStorage {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let full_path = self.resolve_path(path);
        match fs::read(&full_path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::storage(format!(
                "Failed to read {}: {}",
                full_path.display(),
                e
            ))),
        }
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path);
        Self::write_via_temp(&full_path, data).map_err(|source| StoreError::IoFailure {
            path: full_path,
            source,
        })
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let from = self.resolve_path(from);
        let to = self.resolve_path(to);
        fs::create_dir_all(Self::parent_dir(&to)).map_err(|e| {
            StoreError::storage(format!(
                "Failed to create directory {}: {}",
                Self::parent_dir(&to).display(),
                e
            ))
        })?;
        fs::copy(&from, &to).map_err(|e| {
            StoreError::storage(format!(
                "Failed to copy {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).exists()
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let full_dir = self.resolve_path(dir);
        let entries = match fs::read_dir(&full_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                // Hand back paths in the caller's coordinates, not the resolved ones.
                files.push(dir.join(entry.file_name()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::storage(format!(
                "Failed to delete {}: {}",
                full_path.display(),
                e
            ))),
        }
    }
}
