//! Provider-agnostic file storage facade.
//!
//! Callers store, retrieve and remove files through one [`Storage`] type
//! while the concrete backend (local filesystem, S3, Google Drive, Dropbox)
//! is selected by the settings document.
//!
//! # Design Principles
//! - Settings are validated per provider before any backend exists
//! - One published storage instance per provider, created under a lock
//! - Blocking operations on the caller's thread; no runtime required
//! - Removal only through the facade; retrieved handles cannot delete
//!
//! ```no_run
//! use unistore_storage::ProviderRegistry;
//!
//! # fn main() -> unistore_common::Result<()> {
//! let storage = ProviderRegistry::global().get_instance(None)?;
//! let data = storage.store_path("/tmp/a.txt", Some("a.txt"))?;
//! let file = storage.retrieve_file(&data.name)?;
//! println!("retrieved to {}", file.path().display());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod handle;
pub mod listener;
pub mod local;
pub mod memory;
pub mod registry;
pub mod settings;
pub mod storage;

pub use backend::{ByteStream, StorageBackend, StorageData};
pub use handle::StorageFile;
pub use listener::StorageListener;
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
pub use settings::{
    BackendSettings, DropboxSettings, EnvSource, GoogleDriveSettings, ProcessEnv, Provider,
    S3Settings, Settings, StorageClass,
};
pub use storage::{validate_root, Storage};
