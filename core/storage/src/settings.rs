//! Settings document parsing and per-provider validation.
//!
//! A settings document is a JSON object:
//!
//! ```json
//! {
//!   "root": "/data/",
//!   "tmp": "/tmp/us/",
//!   "provider": "aws.s3",
//!   "aws_s3": {
//!     "access_key": "...",
//!     "secret_key": "...",
//!     "s3_region": "us-east-1",
//!     "storage_class": "STANDARD",
//!     "encryption": true,
//!     "tags": [{ "key": "team", "value": "storage" }]
//!   }
//! }
//! ```
//!
//! Construction is atomic: a [`Settings`] is either fully valid for its
//! provider or not produced at all.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use unistore_common::{Error, Result, Secret};

/// Name of the explicit settings path parameter.
pub const SETTINGS_PARAMETER: &str = "universal.storage.settings";

/// Environment variable consulted when no explicit settings path is set.
pub const SETTINGS_ENV_VAR: &str = "universal_storage_settings";

/// Storage classes accepted for the S3 provider.
pub const STORAGE_CLASSES: [&str; 3] = ["REDUCED_REDUNDANCY", "STANDARD_IA", "STANDARD"];

/// Source of environment variables.
///
/// Settings discovery and credential fallbacks read through this trait so
/// tests can supply an isolated environment.
pub trait EnvSource: Send + Sync {
    /// Look up a variable, `None` when unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Storage provider selected by the settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    FileSystem,
    AwsS3,
    GoogleDrive,
    Dropbox,
    /// Any token not listed above. Parses, but no backend accepts it.
    Unknown,
}

impl Provider {
    /// Map a settings token to a provider. Unknown tokens never fail.
    pub fn from_token(token: &str) -> Self {
        match token {
            "file.system" => Provider::FileSystem,
            "aws.s3" => Provider::AwsS3,
            "google.drive" => Provider::GoogleDrive,
            "dropbox" => Provider::Dropbox,
            _ => Provider::Unknown,
        }
    }

    /// The settings token for this provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::FileSystem => "file.system",
            Provider::AwsS3 => "aws.s3",
            Provider::GoogleDrive => "google.drive",
            Provider::Dropbox => "dropbox",
            Provider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// S3 storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    ReducedRedundancy,
    StandardIa,
    Standard,
}

impl StorageClass {
    /// Parse an S3 storage class name. Matching is exact.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "REDUCED_REDUNDANCY" => Ok(StorageClass::ReducedRedundancy),
            "STANDARD_IA" => Ok(StorageClass::StandardIa),
            "STANDARD" => Ok(StorageClass::Standard),
            other => Err(Error::ConfigurationInvalid(format!(
                "{} is an unknown storage class, expected one of {}",
                other,
                STORAGE_CLASSES.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::Standard => "STANDARD",
        }
    }
}

/// Settings for the AWS S3 provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub access_key: Secret,
    pub secret_key: Secret,
    pub region: String,
    pub storage_class: StorageClass,
    /// Server-side encryption at rest.
    pub encryption: bool,
    pub tags: BTreeMap<String, String>,
}

/// Settings for the Google Drive provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleDriveSettings {
    pub client_id: Secret,
    pub client_secret: Secret,
}

/// Settings for the Dropbox provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropboxSettings {
    pub access_token: Secret,
}

/// Provider-specific part of the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSettings {
    FileSystem,
    AwsS3(S3Settings),
    GoogleDrive(GoogleDriveSettings),
    Dropbox(DropboxSettings),
    Unknown,
}

/// Validated, immutable storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    root: String,
    tmp: String,
    backend: BackendSettings,
}

#[derive(Debug, Deserialize)]
struct SettingsDocument {
    root: Option<String>,
    tmp: Option<String>,
    provider: Option<String>,
    #[serde(default)]
    aws_s3: Option<S3Document>,
    #[serde(default)]
    google_drive: Option<GoogleDriveDocument>,
    #[serde(default)]
    dropbox: Option<DropboxDocument>,
}

#[derive(Debug, Deserialize)]
struct S3Document {
    access_key: Option<String>,
    secret_key: Option<String>,
    s3_region: Option<String>,
    storage_class: Option<String>,
    #[serde(default)]
    encryption: bool,
    /// Kept untyped so a malformed array cannot fail the whole document.
    #[serde(default)]
    tags: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GoogleDriveDocument {
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DropboxDocument {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagDocument {
    key: String,
    value: String,
}

impl Settings {
    /// Build settings programmatically for the filesystem provider.
    pub fn file_system(root: impl Into<String>, tmp: impl Into<String>) -> Result<Self> {
        Self::new(root, tmp, BackendSettings::FileSystem)
    }

    /// Build settings programmatically.
    ///
    /// `tmp` is normalized to end with a separator, and so is `root` for the
    /// filesystem provider.
    ///
    /// # Errors
    /// - `root` or `tmp` is blank
    pub fn new(
        root: impl Into<String>,
        tmp: impl Into<String>,
        backend: BackendSettings,
    ) -> Result<Self> {
        let mut root = non_blank(Some(root.into())).ok_or_else(|| missing("root"))?;
        let tmp = non_blank(Some(tmp.into())).ok_or_else(|| missing("tmp"))?;
        if backend == BackendSettings::FileSystem {
            root = complete_separator(&root);
        }
        Ok(Self {
            root,
            tmp: complete_separator(&tmp),
            backend,
        })
    }

    /// Load settings from a JSON file, using the process environment for
    /// credential fallbacks.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_env(path, &ProcessEnv)
    }

    /// Load settings from a JSON file with an explicit environment.
    pub fn from_file_with_env(path: impl AsRef<Path>, env: &dyn EnvSource) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationInvalid(format!("reading settings file {:?}: {}", path, e))
        })?;
        Self::from_json_with_env(&contents, env)
    }

    /// Parse settings from a JSON string, using the process environment for
    /// credential fallbacks.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_json_with_env(json, &ProcessEnv)
    }

    /// Parse settings from a JSON string with an explicit environment.
    pub fn from_json_with_env(json: &str, env: &dyn EnvSource) -> Result<Self> {
        let doc: SettingsDocument = serde_json::from_str(json)?;

        let root = required(doc.root, "root")?;
        let tmp = required(doc.tmp, "tmp")?;
        let provider = Provider::from_token(&required(doc.provider, "provider")?);

        let backend = match provider {
            Provider::FileSystem => BackendSettings::FileSystem,
            Provider::AwsS3 => {
                let section = doc.aws_s3.ok_or_else(|| missing("aws_s3"))?;
                BackendSettings::AwsS3(parse_s3(section, env)?)
            }
            Provider::GoogleDrive => {
                let section = doc.google_drive.ok_or_else(|| missing("google_drive"))?;
                BackendSettings::GoogleDrive(GoogleDriveSettings {
                    client_id: credential(section.client_id, "client_id", env)?,
                    client_secret: credential(section.client_secret, "client_secret", env)?,
                })
            }
            Provider::Dropbox => {
                let section = doc.dropbox.ok_or_else(|| missing("dropbox"))?;
                BackendSettings::Dropbox(DropboxSettings {
                    access_token: credential(section.access_token, "access_token", env)?,
                })
            }
            Provider::Unknown => BackendSettings::Unknown,
        };

        Self::new(root, tmp, backend)
    }

    /// Backend-specific storage root (local path, bucket name, drive folder).
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Local scratch directory, always ending with a separator.
    pub fn tmp(&self) -> &str {
        &self.tmp
    }

    /// Local scratch directory as a path.
    pub fn tmp_dir(&self) -> &Path {
        Path::new(&self.tmp)
    }

    pub fn provider(&self) -> Provider {
        match self.backend {
            BackendSettings::FileSystem => Provider::FileSystem,
            BackendSettings::AwsS3(_) => Provider::AwsS3,
            BackendSettings::GoogleDrive(_) => Provider::GoogleDrive,
            BackendSettings::Dropbox(_) => Provider::Dropbox,
            BackendSettings::Unknown => Provider::Unknown,
        }
    }

    pub fn backend(&self) -> &BackendSettings {
        &self.backend
    }

    pub fn s3(&self) -> Option<&S3Settings> {
        match &self.backend {
            BackendSettings::AwsS3(s3) => Some(s3),
            _ => None,
        }
    }

    pub fn google_drive(&self) -> Option<&GoogleDriveSettings> {
        match &self.backend {
            BackendSettings::GoogleDrive(drive) => Some(drive),
            _ => None,
        }
    }

    pub fn dropbox(&self) -> Option<&DropboxSettings> {
        match &self.backend {
            BackendSettings::Dropbox(dropbox) => Some(dropbox),
            _ => None,
        }
    }
}

/// Resolve the settings document path.
///
/// The explicit parameter wins over the environment variable. A path that
/// does not reference an existing regular file is rejected.
pub fn locate_settings(explicit: Option<&Path>, env: &dyn EnvSource) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => env.var(SETTINGS_ENV_VAR).map(PathBuf::from).ok_or_else(|| {
            Error::ConfigurationMissing(format!(
                "no settings location found, set the {} parameter or the {} environment variable",
                SETTINGS_PARAMETER, SETTINGS_ENV_VAR
            ))
        })?,
    };

    if !path.exists() || path.is_dir() {
        return Err(Error::ConfigurationInvalid(format!(
            "the settings file {:?} either doesn't exist or is a folder",
            path
        )));
    }
    Ok(path)
}

/// Append the platform separator unless the path already ends with one.
pub fn complete_separator(path: &str) -> String {
    if path.ends_with(MAIN_SEPARATOR) || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}{}", path, MAIN_SEPARATOR)
    }
}

fn parse_s3(section: S3Document, env: &dyn EnvSource) -> Result<S3Settings> {
    let access_key = credential(section.access_key, "access_key", env)?;
    let secret_key = credential(section.secret_key, "secret_key", env)?;
    let region = non_blank(section.s3_region).ok_or_else(|| missing("s3_region"))?;
    let storage_class =
        non_blank(section.storage_class).ok_or_else(|| missing("storage_class"))?;
    let storage_class = StorageClass::parse(&storage_class)?;

    Ok(S3Settings {
        access_key,
        secret_key,
        region,
        storage_class,
        encryption: section.encryption,
        tags: parse_tags(section.tags),
    })
}

/// Tags are optional; anything other than a well-formed array yields no tags.
fn parse_tags(raw: Option<serde_json::Value>) -> BTreeMap<String, String> {
    raw.and_then(|value| serde_json::from_value::<Vec<TagDocument>>(value).ok())
        .map(|tags| tags.into_iter().map(|t| (t.key, t.value)).collect())
        .unwrap_or_default()
}

/// A credential taken from the document, falling back to the identically
/// named environment variable when absent or blank.
fn credential(value: Option<String>, field: &str, env: &dyn EnvSource) -> Result<Secret> {
    non_blank(value)
        .or_else(|| non_blank(env.var(field)))
        .map(Secret::new)
        .ok_or_else(|| missing(field))
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    non_blank(value).ok_or_else(|| missing(field))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing(field: &str) -> Error {
    Error::ConfigurationInvalid(format!(
        "attribute {} is missing within the settings",
        field
    ))
}
