//! Local filesystem storage backend.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::{ByteStream, StorageBackend, StorageData};
use crate::settings::Settings;
use unistore_common::{Error, Result, StoragePath};

/// Local filesystem storage backend.
///
/// Stores files below a root directory that must already exist.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend with the given root directory.
    ///
    /// The root is not created here; the facade's root validation rejects a
    /// missing root before any operation runs.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Bind a backend from filesystem settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.root()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a StoragePath to a filesystem path.
    fn to_fs_path(&self, path: &StoragePath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }

    fn storage_data(&self, path: &StoragePath, fs_path: &Path) -> StorageData {
        StorageData {
            name: path.name().unwrap_or("/").to_string(),
            remote_link: None,
            remote_id: None,
            remote_path: fs_path.to_string_lossy().into_owned(),
        }
    }

    /// Resolve a path that must name an existing file; `action` names the
    /// calling operation in the error.
    fn existing_file(&self, path: &StoragePath, action: &str) -> Result<PathBuf> {
        let fs_path = self.to_fs_path(path);

        if !fs_path.exists() {
            return Err(Error::NotFound(format!("File not found: {}", path)));
        }

        if fs_path.is_dir() {
            return Err(Error::Storage(format!(
                "Cannot {} {}: it is a folder",
                action, path
            )));
        }

        Ok(fs_path)
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<StorageData> {
        let fs_path = self.to_fs_path(path);

        if fs_path.is_dir() {
            return Err(Error::Storage(format!(
                "Cannot replace folder {} with a file",
                path
            )));
        }

        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&fs_path, &data)?;
        Ok(self.storage_data(path, &fs_path))
    }

    fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        let fs_path = self.existing_file(path, "retrieve")?;
        Ok(fs::read(&fs_path)?)
    }

    fn download_stream(&self, path: &StoragePath) -> Result<ByteStream> {
        let fs_path = self.existing_file(path, "stream")?;
        Ok(Box::new(fs::File::open(&fs_path)?))
    }

    fn exists(&self, path: &StoragePath) -> Result<bool> {
        Ok(self.to_fs_path(path).exists())
    }

    fn delete(&self, path: &StoragePath) -> Result<()> {
        let fs_path = self.existing_file(path, "remove file")?;
        fs::remove_file(&fs_path)?;
        Ok(())
    }

    fn create_dir(&self, path: &StoragePath) -> Result<StorageData> {
        let fs_path = self.to_fs_path(path);

        if fs_path.is_file() {
            return Err(Error::Storage(format!(
                "Path already exists as a file: {}",
                path
            )));
        }

        fs::create_dir_all(&fs_path)?;
        Ok(self.storage_data(path, &fs_path))
    }

    fn delete_dir(&self, path: &StoragePath) -> Result<()> {
        if path.is_root() {
            return Err(Error::Storage(
                "Cannot remove the storage root".to_string(),
            ));
        }

        let fs_path = self.to_fs_path(path);

        if !fs_path.exists() {
            return Err(Error::NotFound(format!("Folder not found: {}", path)));
        }

        if !fs_path.is_dir() {
            return Err(Error::Storage(format!("Not a folder: {}", path)));
        }

        fs::remove_dir_all(&fs_path)?;
        Ok(())
    }
}
