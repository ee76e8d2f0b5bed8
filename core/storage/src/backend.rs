//! Storage backend trait definition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

use unistore_common::{Result, StoragePath};

/// Information about a stored file or created folder.
///
/// Purely informational; the facade never uses it to look up state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageData {
    /// Name of the object (last path component).
    pub name: String,
    /// Shareable link, when the provider offers one.
    pub remote_link: Option<String>,
    /// Provider-specific object identifier.
    pub remote_id: Option<String>,
    /// Location of the object within the provider.
    pub remote_path: String,
}

impl fmt::Display for StorageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", self.remote_path)?;
        writeln!(f, "{}", self.remote_id.as_deref().unwrap_or("-"))?;
        write!(f, "{}", self.remote_link.as_deref().unwrap_or("-"))
    }
}

/// Byte stream type for download operations.
pub type ByteStream = Box<dyn Read + Send>;

/// Storage backend trait for different providers.
///
/// All operations are blocking and run on the caller's thread. Backends are
/// shared between threads once published, so implementations must be safe
/// for concurrent use. Implementations handle their own authentication.
pub trait StorageBackend: Send + Sync {
    /// Get the backend name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Upload data to the storage.
    ///
    /// # Postconditions
    /// - Object is created or replaced at the specified path
    /// - Missing parent folders are created
    ///
    /// # Errors
    /// - Network/I/O errors
    fn upload(&self, path: &StoragePath, data: Vec<u8>) -> Result<StorageData>;

    /// Download an object.
    ///
    /// # Errors
    /// - `NotFound` when no object exists at path
    /// - Network/I/O errors
    fn download(&self, path: &StoragePath) -> Result<Vec<u8>>;

    /// Download an object as a reader.
    fn download_stream(&self, path: &StoragePath) -> Result<ByteStream>;

    /// Check if a path exists.
    fn exists(&self, path: &StoragePath) -> Result<bool>;

    /// Delete a file.
    ///
    /// # Errors
    /// - `NotFound` when no file exists at path
    /// - Not permitted (e.g., folder)
    fn delete(&self, path: &StoragePath) -> Result<()>;

    /// Create a folder, including parents. Succeeds if it already exists.
    fn create_dir(&self, path: &StoragePath) -> Result<StorageData>;

    /// Delete a folder and everything below it.
    ///
    /// # Errors
    /// - `NotFound` when no folder exists at path
    fn delete_dir(&self, path: &StoragePath) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_data_serialization() {
        let data = StorageData {
            name: "a.txt".to_string(),
            remote_link: None,
            remote_id: Some("obj-1".to_string()),
            remote_path: "/data/a.txt".to_string(),
        };

        let json = serde_json::to_string(&data).unwrap();
        let deserialized: StorageData = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, data);
    }

    #[test]
    fn test_storage_data_display() {
        let data = StorageData {
            name: "a.txt".to_string(),
            remote_link: Some("https://example.com/a.txt".to_string()),
            remote_id: None,
            remote_path: "/data/a.txt".to_string(),
        };

        assert_eq!(
            data.to_string(),
            "a.txt\n/data/a.txt\n-\nhttps://example.com/a.txt"
        );
    }
}
