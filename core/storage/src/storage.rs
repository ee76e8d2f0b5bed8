//! Provider-agnostic storage facade.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ByteStream, StorageBackend, StorageData};
use crate::handle::StorageFile;
use crate::listener::{ListenerSlot, StorageListener};
use crate::settings::{Provider, Settings};
use unistore_common::{Error, Result, StoragePath};

/// A live storage instance bound to one provider.
///
/// Operations are blocking and may run concurrently from several threads.
/// Retrieved files are written to unique subfolders of the configured
/// temp directory, and [`Storage::clean`] waits for in-flight retrievals
/// before purging it.
pub struct Storage {
    settings: Settings,
    backend: Arc<dyn StorageBackend>,
    listener: ListenerSlot,
    tmp_guard: RwLock<()>,
}

impl Storage {
    /// Bind settings to a backend. Does not validate the root; see
    /// [`Storage::validate_root`].
    pub fn new(settings: Settings, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            settings,
            backend,
            listener: ListenerSlot::default(),
            tmp_guard: RwLock::new(()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provider(&self) -> Provider {
        self.settings.provider()
    }

    /// Name of the bound backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Attach the observer, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn StorageListener>) {
        self.listener.set(Some(listener));
    }

    pub fn clear_listener(&self) {
        self.listener.set(None);
    }

    /// Check the configured root before any backend work.
    ///
    /// For the filesystem provider the root must be an existing directory.
    /// Remote providers validate their root on first use instead.
    pub fn validate_root(&self) -> Result<()> {
        validate_root(&self.settings)
    }

    /// Store a local file handle. Replaces any object at the target path.
    ///
    /// `target` defaults to the file's own name at the storage root.
    pub fn store_file(&self, file: &StorageFile, target: Option<&str>) -> Result<StorageData> {
        self.store_path(file.path(), target)
    }

    /// Store the file at a local path. Replaces any object at the target path.
    ///
    /// `target` defaults to the file's own name at the storage root.
    pub fn store_path(&self, source: impl AsRef<Path>, target: Option<&str>) -> Result<StorageData> {
        let source = source.as_ref();
        self.listener.notify(|l| l.on_store_file());

        let result = self.do_store(source, target);
        match &result {
            Ok(data) => {
                info!(source = %source.display(), remote = %data.remote_path, "file stored");
                self.listener.notify(|l| l.on_file_stored(data));
            }
            Err(e) => self.report(e),
        }
        result
    }

    fn do_store(&self, source: &Path, target: Option<&str>) -> Result<StorageData> {
        let target = match target {
            Some(target) => StoragePath::parse(target)?,
            None => {
                let name = source
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("{} has no file name", source.display()))
                    })?;
                StoragePath::root().join(name)?
            }
        };
        if target.is_root() {
            return Err(Error::InvalidInput(
                "Cannot store a file at the storage root itself".to_string(),
            ));
        }

        self.validate_root()?;
        let data = fs::read(source)?;
        self.backend.upload(&target, data)
    }

    /// Remove a file from the storage.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        self.listener.notify(|l| l.on_remove_file());

        let result = self.with_path(path, |p| self.backend.delete(p));
        match &result {
            Ok(()) => {
                info!(path, "file removed");
                self.listener.notify(|l| l.on_file_removed());
            }
            Err(e) => self.report(e),
        }
        result
    }

    /// Create a folder (including parents) within the storage.
    pub fn create_folder(&self, path: &str) -> Result<StorageData> {
        self.listener.notify(|l| l.on_create_folder());

        let result = self.with_path(path, |p| self.backend.create_dir(p));
        match &result {
            Ok(data) => {
                info!(path, "folder created");
                self.listener.notify(|l| l.on_folder_created(data));
            }
            Err(e) => self.report(e),
        }
        result
    }

    /// Remove a folder and everything below it.
    pub fn remove_folder(&self, path: &str) -> Result<()> {
        self.listener.notify(|l| l.on_remove_folder());

        let result = self.with_path(path, |p| {
            if !self.backend.exists(p)? {
                return Err(Error::NotFound(format!("Folder not found: {}", p)));
            }
            self.backend.delete_dir(p)
        });
        match &result {
            Ok(()) => {
                info!(path, "folder removed");
                self.listener.notify(|l| l.on_folder_removed());
            }
            Err(e) => self.report(e),
        }
        result
    }

    /// Retrieve a file into the temp directory.
    ///
    /// Each call writes into its own uniquely named subfolder, so concurrent
    /// retrievals of the same path never clobber each other.
    pub fn retrieve_file(&self, path: &str) -> Result<StorageFile> {
        let result = self.do_retrieve(path);
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    fn do_retrieve(&self, path: &str) -> Result<StorageFile> {
        let storage_path = StoragePath::parse(path)?;
        let name = storage_path
            .name()
            .ok_or_else(|| Error::InvalidInput("Cannot retrieve the storage root".to_string()))?
            .to_string();

        self.validate_root()?;
        // Held across the download so clean cannot purge tmp mid-retrieval.
        let _guard = self.tmp_read()?;
        let data = self.backend.download(&storage_path)?;

        let dir = self.settings.tmp_dir().join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;
        let local = dir.join(name);
        fs::write(&local, data)?;

        debug!(path, local = %local.display(), "file retrieved");
        Ok(StorageFile::new(local))
    }

    /// Retrieve a file as a byte stream without touching the temp directory.
    pub fn retrieve_file_as_stream(&self, path: &str) -> Result<ByteStream> {
        let result = self.with_path(path, |p| self.backend.download_stream(p));
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    /// Purge the temp directory contents. Never touches the storage root.
    pub fn clean(&self) -> Result<()> {
        let result = self.do_clean();
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    fn do_clean(&self) -> Result<()> {
        let _guard = self.tmp_write()?;
        let tmp = self.settings.tmp_dir();
        if !tmp.exists() {
            return Ok(());
        }

        let mut removed = 0usize;
        for entry in fs::read_dir(tmp)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
            removed += 1;
        }

        info!(tmp = %tmp.display(), removed, "temp directory cleaned");
        Ok(())
    }

    fn with_path<T>(&self, path: &str, op: impl FnOnce(&StoragePath) -> Result<T>) -> Result<T> {
        let storage_path = StoragePath::parse(path)?;
        self.validate_root()?;
        op(&storage_path)
    }

    fn report(&self, error: &Error) {
        warn!(provider = %self.provider(), error = %error, "storage operation failed");
        self.listener.notify(|l| l.on_error(error));
    }

    fn tmp_read(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.tmp_guard
            .read()
            .map_err(|_| Error::Storage("temp directory guard poisoned".to_string()))
    }

    fn tmp_write(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.tmp_guard
            .write()
            .map_err(|_| Error::Storage("temp directory guard poisoned".to_string()))
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("provider", &self.provider())
            .field("backend", &self.backend_name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Root check shared by every backend.
pub fn validate_root(settings: &Settings) -> Result<()> {
    if settings.provider() == Provider::FileSystem && !Path::new(settings.root()).is_dir() {
        return Err(Error::Storage(format!(
            "{} is not a folder",
            settings.root()
        )));
    }
    Ok(())
}
