//! In-memory storage backend.
//!
//! Behaves like a remote object store: objects live under a bucket-style
//! root, receive provider ids and links, and nothing touches the local disk.
//! Used as the stand-in for remote providers in tests and development.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::backend::{ByteStream, StorageBackend, StorageData};
use crate::settings::Settings;
use unistore_common::{Error, Result, StoragePath};

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File { id: String, data: Vec<u8> },
    Folder { id: String },
}

/// In-memory storage backend. All data is lost on drop.
pub struct MemoryBackend {
    root: String,
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryBackend {
    /// Create a new empty backend under the given root (bucket) name.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Bind a backend from settings; only the root is used.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.root()))
    }

    /// Number of stored files.
    pub fn file_count(&self) -> Result<usize> {
        Ok(self
            .read()?
            .values()
            .filter(|e| matches!(e, Entry::File { .. }))
            .count())
    }

    fn key(path: &StoragePath) -> String {
        path.to_relative_string()
    }

    fn storage_data(&self, path: &StoragePath, id: &str) -> StorageData {
        let key = Self::key(path);
        StorageData {
            name: path.name().unwrap_or("/").to_string(),
            remote_link: Some(format!("memory://{}/{}", self.root, key)),
            remote_id: Some(id.to_string()),
            remote_path: format!("{}/{}", self.root.trim_end_matches('/'), key),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.entries
            .read()
            .map_err(|_| Error::Storage("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| Error::Storage("memory backend lock poisoned".to_string()))
    }
}

/// Insert folder markers for every ancestor of `path`.
fn ensure_parents(entries: &mut BTreeMap<String, Entry>, path: &StoragePath) -> Result<()> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.is_root() {
            break;
        }
        match entries.get(&MemoryBackend::key(&dir)) {
            Some(Entry::File { .. }) => {
                return Err(Error::Storage(format!("Parent {} is a file", dir)));
            }
            Some(Entry::Folder { .. }) => {}
            None => {
                entries.insert(
                    MemoryBackend::key(&dir),
                    Entry::Folder {
                        id: Uuid::new_v4().to_string(),
                    },
                );
            }
        }
        current = dir.parent();
    }
    Ok(())
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<StorageData> {
        let key = Self::key(path);
        let mut entries = self.write()?;

        if let Some(Entry::Folder { .. }) = entries.get(&key) {
            return Err(Error::Storage(format!(
                "Cannot replace folder {} with a file",
                path
            )));
        }
        ensure_parents(&mut entries, path)?;

        let id = Uuid::new_v4().to_string();
        entries.insert(
            key,
            Entry::File {
                id: id.clone(),
                data,
            },
        );

        Ok(self.storage_data(path, &id))
    }

    fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        match self.read()?.get(&Self::key(path)) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Folder { .. }) => {
                Err(Error::Storage(format!("Cannot retrieve {}: it is a folder", path)))
            }
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    fn download_stream(&self, path: &StoragePath) -> Result<ByteStream> {
        let data = self.download(path)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn exists(&self, path: &StoragePath) -> Result<bool> {
        Ok(path.is_root() || self.read()?.contains_key(&Self::key(path)))
    }

    fn delete(&self, path: &StoragePath) -> Result<()> {
        let key = Self::key(path);
        let mut entries = self.write()?;

        match entries.get(&key) {
            Some(Entry::File { .. }) => {
                entries.remove(&key);
                Ok(())
            }
            Some(Entry::Folder { .. }) => Err(Error::Storage(format!(
                "Cannot remove file {}: it is a folder",
                path
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    fn create_dir(&self, path: &StoragePath) -> Result<StorageData> {
        let key = Self::key(path);
        let mut entries = self.write()?;

        if let Some(entry) = entries.get(&key) {
            return match entry {
                Entry::Folder { id } => Ok(self.storage_data(path, id)),
                Entry::File { .. } => Err(Error::Storage(format!(
                    "Path already exists as a file: {}",
                    path
                ))),
            };
        }
        ensure_parents(&mut entries, path)?;

        let id = Uuid::new_v4().to_string();
        entries.insert(key, Entry::Folder { id: id.clone() });
        Ok(self.storage_data(path, &id))
    }

    fn delete_dir(&self, path: &StoragePath) -> Result<()> {
        if path.is_root() {
            return Err(Error::Storage(
                "Cannot remove the storage root".to_string(),
            ));
        }

        let key = Self::key(path);
        let mut entries = self.write()?;

        match entries.get(&key) {
            Some(Entry::Folder { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::Storage(format!("Not a folder: {}", path)));
            }
            None => return Err(Error::NotFound(format!("Folder not found: {}", path))),
        }

        let prefix = format!("{}/", key);
        entries.retain(|k, _| k != &key && !k.starts_with(&prefix));
        Ok(())
    }
}
