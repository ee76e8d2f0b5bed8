//! Restricted local file handle.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};

use unistore_common::{Error, Result};

const DELETE_UNSUPPORTED: &str = "use the remove_file method of the storage facade";

/// A local file reference that cannot be deleted directly.
///
/// Handles are returned by [`crate::Storage::retrieve_file`] and may be passed
/// back to [`crate::Storage::store_file`]. Every read or inspect operation is
/// available; deletion always fails so removal goes through the facade.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageFile {
    path: PathBuf,
}

impl StorageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final component of the path, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn is_file(&self) -> bool {
        self.path.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }

    /// Size in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Last modification time.
    pub fn modified(&self) -> Result<DateTime<Utc>> {
        Ok(std::fs::metadata(&self.path)?.modified()?.into())
    }

    /// Open the file read-only.
    pub fn open(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    pub fn read_to_string(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }

    /// Always fails with [`Error::Unsupported`].
    pub fn delete(&self) -> Result<()> {
        Err(Error::Unsupported(DELETE_UNSUPPORTED.to_string()))
    }

    /// Always fails with [`Error::Unsupported`].
    pub fn delete_on_exit(&self) -> Result<()> {
        Err(Error::Unsupported(DELETE_UNSUPPORTED.to_string()))
    }
}

impl AsRef<Path> for StorageFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl From<PathBuf> for StorageFile {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}
