//! Operation lifecycle observer.

use std::sync::{Arc, RwLock};

use crate::backend::StorageData;
use unistore_common::Error;

/// Receives lifecycle callbacks around storage operations.
///
/// Every method has a no-op default, so implementers override only the
/// events they care about. Callbacks run synchronously on the caller's
/// thread. When an operation fails, `on_error` fires in place of the
/// matching "after" callback; the caller still receives the error.
pub trait StorageListener: Send + Sync {
    /// Called just before a file is stored.
    fn on_store_file(&self) {}

    /// Called after a file was stored.
    fn on_file_stored(&self, _data: &StorageData) {}

    /// Called just before a folder is created.
    fn on_create_folder(&self) {}

    /// Called after a folder was created.
    fn on_folder_created(&self, _data: &StorageData) {}

    /// Called just before a file is removed.
    fn on_remove_file(&self) {}

    /// Called after a file was removed.
    fn on_file_removed(&self) {}

    /// Called just before a folder is removed.
    fn on_remove_folder(&self) {}

    /// Called after a folder was removed.
    fn on_folder_removed(&self) {}

    /// Called whenever an operation fails.
    fn on_error(&self, _error: &Error) {}
}

/// Optional listener attached to a storage instance.
#[derive(Default)]
pub(crate) struct ListenerSlot {
    inner: RwLock<Option<Arc<dyn StorageListener>>>,
}

impl ListenerSlot {
    pub(crate) fn set(&self, listener: Option<Arc<dyn StorageListener>>) {
        match self.inner.write() {
            Ok(mut slot) => *slot = listener,
            Err(poisoned) => *poisoned.into_inner() = listener,
        }
    }

    /// Snapshot of the current listener.
    ///
    /// Callbacks run on the snapshot, never under the slot lock, so a
    /// listener may replace itself from inside a callback.
    pub(crate) fn get(&self) -> Option<Arc<dyn StorageListener>> {
        match self.inner.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn notify(&self, event: impl FnOnce(&dyn StorageListener)) {
        if let Some(listener) = self.get() {
            event(listener.as_ref());
        }
    }
}
