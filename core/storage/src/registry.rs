//! Provider registry: one live storage instance per provider.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::local::LocalBackend;
use crate::settings::{locate_settings, EnvSource, ProcessEnv, Provider, Settings};
use crate::storage::Storage;
use unistore_common::{Error, Result};

/// Factory function type for binding a backend from resolved settings.
pub type ProviderFactory = Box<dyn Fn(&Settings) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// Registry of backend factories and published storage instances.
///
/// Factories form a static dispatch table keyed by [`Provider`]. At most one
/// [`Storage`] is published per provider; lookup, construction and
/// publication happen under a single mutex shared by all providers, which
/// is never held while storage operations run.
///
/// A process-wide registry is available through [`ProviderRegistry::global`].
/// It is created on first use and lives until process exit. Tests and
/// embedders that need isolation create their own registry.
pub struct ProviderRegistry {
    factories: HashMap<Provider, ProviderFactory>,
    instances: Mutex<HashMap<Provider, Arc<Storage>>>,
    settings_path: RwLock<Option<PathBuf>>,
    env: Arc<dyn EnvSource>,
}

impl ProviderRegistry {
    /// Create a new registry with no factories.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
            settings_path: RwLock::new(None),
            env: Arc::new(ProcessEnv),
        }
    }

    /// Replace the environment used for settings discovery and credential
    /// fallbacks.
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// Process-wide registry with the default factories.
    pub fn global() -> &'static ProviderRegistry {
        static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();
        GLOBAL.get_or_init(create_default_registry)
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - The provider already has a factory
    /// - The provider is `Unknown`
    pub fn register(&mut self, provider: Provider, factory: ProviderFactory) -> Result<()> {
        if provider == Provider::Unknown {
            return Err(Error::InvalidInput(
                "Cannot register a factory for an unknown provider".to_string(),
            ));
        }
        if self.factories.contains_key(&provider) {
            return Err(Error::InvalidInput(format!(
                "Provider '{}' is already registered",
                provider
            )));
        }
        self.factories.insert(provider, factory);
        Ok(())
    }

    /// Get list of providers with a registered factory.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.factories.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Check if a provider has a registered factory.
    pub fn has_provider(&self, provider: Provider) -> bool {
        self.factories.contains_key(&provider)
    }

    /// Set the explicit settings path, consulted before the
    /// `universal_storage_settings` environment variable.
    pub fn set_settings_path(&self, path: Option<PathBuf>) {
        match self.settings_path.write() {
            Ok(mut slot) => *slot = path,
            Err(poisoned) => *poisoned.into_inner() = path,
        }
    }

    /// Get the storage instance for the given settings, or for the
    /// discovered settings document when `settings` is `None`.
    ///
    /// If the provider already has a published instance built from equal
    /// settings, that instance is returned after its root is re-validated.
    /// Otherwise a new backend is constructed, its root validated, and the
    /// instance published in place of any previous one.
    ///
    /// # Errors
    /// - `ConfigurationMissing` when no settings location is found
    /// - `ConfigurationInvalid` when the document is unusable, the provider
    ///   is unknown, or no factory is registered for it
    /// - I/O failure when root validation fails
    pub fn get_instance(&self, settings: Option<Settings>) -> Result<Arc<Storage>> {
        let settings = match settings {
            Some(settings) => settings,
            None => self.load_settings().map_err(|e| {
                if e.is_configuration() {
                    warn!(error = %e, "storage settings rejected");
                } else {
                    warn!(error = %e, "storage settings could not be read");
                }
                e
            })?,
        };
        let provider = settings.provider();

        if provider == Provider::Unknown {
            return Err(Error::ConfigurationInvalid(
                "the settings name an unknown provider".to_string(),
            ));
        }

        let mut instances = self.lock_instances()?;

        if let Some(existing) = instances.get(&provider) {
            if existing.settings() == &settings {
                existing.validate_root()?;
                debug!(%provider, "reusing published storage");
                return Ok(existing.clone());
            }
        }

        let factory = self.factories.get(&provider).ok_or_else(|| {
            Error::ConfigurationInvalid(format!(
                "no backend is registered for provider '{}'",
                provider
            ))
        })?;

        let backend = factory(&settings)?;
        let storage = Storage::new(settings, backend);
        if let Err(e) = storage.validate_root() {
            warn!(%provider, error = %e, "root validation failed");
            return Err(e);
        }

        let storage = Arc::new(storage);
        instances.insert(provider, storage.clone());
        info!(%provider, backend = storage.backend_name(), "storage published");
        Ok(storage)
    }

    /// The published instance for a provider, if any.
    pub fn published(&self, provider: Provider) -> Result<Option<Arc<Storage>>> {
        Ok(self.lock_instances()?.get(&provider).cloned())
    }

    fn load_settings(&self) -> Result<Settings> {
        let explicit = match self.settings_path.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let path = locate_settings(explicit.as_deref(), self.env.as_ref())?;
        debug!(path = %path.display(), "loading storage settings");
        Settings::from_file_with_env(&path, self.env.as_ref())
    }

    fn lock_instances(&self) -> Result<MutexGuard<'_, HashMap<Provider, Arc<Storage>>>> {
        self.instances
            .lock()
            .map_err(|_| Error::Storage("provider registry lock poisoned".to_string()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the default factories.
///
/// Only the filesystem backend ships with this crate; remote providers are
/// bound by registering their client factories.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.factories.insert(
        Provider::FileSystem,
        Box::new(|settings| Ok(Arc::new(LocalBackend::from_settings(settings)?))),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Arc<dyn EnvSource> {
        Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<String, String>>(),
        )
    }

    fn counting_memory_factory(counter: Arc<AtomicUsize>) -> ProviderFactory {
        Box::new(move |settings| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryBackend::from_settings(settings)?))
        })
    }

    fn fs_settings(root: &Path, tmp: &Path) -> Settings {
        Settings::file_system(root.to_str().unwrap(), tmp.to_str().unwrap()).unwrap()
    }

    fn write_settings(dir: &Path, doc: serde_json::Value) -> PathBuf {
        let path = dir.join("settings.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = create_default_registry();
        registry
            .register(
                Provider::Dropbox,
                Box::new(|s| Ok(Arc::new(MemoryBackend::from_settings(s)?))),
            )
            .unwrap();

        assert!(registry.has_provider(Provider::FileSystem));
        assert!(registry.has_provider(Provider::Dropbox));
        assert!(!registry.has_provider(Provider::AwsS3));
        assert_eq!(
            registry.providers(),
            vec![Provider::FileSystem, Provider::Dropbox]
        );
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = create_default_registry();
        let result = registry.register(
            Provider::FileSystem,
            Box::new(|s| Ok(Arc::new(LocalBackend::from_settings(s)?))),
        );
        assert!(result.is_err());
        assert!(registry
            .register(
                Provider::Unknown,
                Box::new(|s| Ok(Arc::new(MemoryBackend::from_settings(s)?))),
            )
            .is_err());
    }

    #[test]
    fn test_get_instance_with_explicit_settings() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let registry = create_default_registry();

        let storage = registry
            .get_instance(Some(fs_settings(root.path(), tmp.path())))
            .unwrap();
        assert_eq!(storage.provider(), Provider::FileSystem);
        assert_eq!(storage.backend_name(), "local");

        let published = registry.published(Provider::FileSystem).unwrap().unwrap();
        assert!(Arc::ptr_eq(&storage, &published));
    }

    #[test]
    fn test_missing_root_is_not_published() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let registry = create_default_registry();

        let err = registry
            .get_instance(Some(fs_settings(&root.path().join("absent"), tmp.path())))
            .unwrap_err();
        assert!(err.is_io_failure());
        assert!(registry.published(Provider::FileSystem).unwrap().is_none());
    }

    #[test]
    fn test_reuse_and_replace() {
        let root_a = TempDir::new().unwrap();
        let root_b = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let registry = create_default_registry();

        let first = registry
            .get_instance(Some(fs_settings(root_a.path(), tmp.path())))
            .unwrap();
        let again = registry
            .get_instance(Some(fs_settings(root_a.path(), tmp.path())))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let swapped = registry
            .get_instance(Some(fs_settings(root_b.path(), tmp.path())))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &swapped));
        let published = registry.published(Provider::FileSystem).unwrap().unwrap();
        assert!(Arc::ptr_eq(&swapped, &published));
    }

    #[test]
    fn test_reuse_revalidates_root() {
        let parent = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let registry = create_default_registry();

        registry
            .get_instance(Some(fs_settings(&root, tmp.path())))
            .unwrap();
        std::fs::remove_dir(&root).unwrap();

        let err = registry
            .get_instance(Some(fs_settings(&root, tmp.path())))
            .unwrap_err();
        assert!(err.is_io_failure());
    }

    #[test]
    fn test_concurrent_first_requests_construct_once() {
        const THREADS: usize = 16;
        let tmp = TempDir::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        registry
            .register(Provider::AwsS3, counting_memory_factory(counter.clone()))
            .unwrap();

        let doc = serde_json::json!({
            "root": "bucket",
            "tmp": tmp.path().to_str().unwrap(),
            "provider": "aws.s3",
            "aws_s3": {
                "access_key": "ak",
                "secret_key": "sk",
                "s3_region": "us-east-1",
                "storage_class": "STANDARD",
            },
        })
        .to_string();
        let settings =
            Settings::from_json_with_env(&doc, &HashMap::<String, String>::new()).unwrap();

        let barrier = Barrier::new(THREADS);
        let instances: Vec<Arc<Storage>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.get_instance(Some(settings.clone())).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[test]
    fn test_unregistered_and_unknown_providers() {
        let tmp = TempDir::new().unwrap();
        let registry = create_default_registry();
        let tmp_str = tmp.path().to_str().unwrap();

        let doc = serde_json::json!({
            "root": "/apps",
            "tmp": tmp_str,
            "provider": "dropbox",
            "dropbox": {"access_token": "tok"},
        })
        .to_string();
        let dropbox =
            Settings::from_json_with_env(&doc, &HashMap::<String, String>::new()).unwrap();
        let err = registry.get_instance(Some(dropbox)).unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
        assert!(err.to_string().contains("dropbox"));

        let doc = serde_json::json!({"root": "/r", "tmp": tmp_str, "provider": "ftp"}).to_string();
        let unknown =
            Settings::from_json_with_env(&doc, &HashMap::<String, String>::new()).unwrap();
        assert!(matches!(
            registry.get_instance(Some(unknown)),
            Err(Error::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_discovery_from_env() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let conf = TempDir::new().unwrap();
        let path = write_settings(
            conf.path(),
            serde_json::json!({
                "root": root.path().to_str().unwrap(),
                "tmp": tmp.path().to_str().unwrap(),
                "provider": "file.system",
            }),
        );

        let registry = create_default_registry().with_env(env(&[(
            crate::settings::SETTINGS_ENV_VAR,
            path.to_str().unwrap(),
        )]));
        let storage = registry.get_instance(None).unwrap();
        assert_eq!(storage.provider(), Provider::FileSystem);

        let source = conf.path().join("a.txt");
        std::fs::write(&source, b"hello").unwrap();
        let data = storage.store_path(&source, Some("a.txt")).unwrap();
        assert_eq!(data.name, "a.txt");
        assert_eq!(Path::new(&data.remote_path), root.path().join("a.txt"));

        let file = storage.retrieve_file("a.txt").unwrap();
        assert!(file.path().starts_with(tmp.path()));
    }

    #[test]
    fn test_explicit_path_wins_over_env() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let conf = TempDir::new().unwrap();
        let path = write_settings(
            conf.path(),
            serde_json::json!({
                "root": root.path().to_str().unwrap(),
                "tmp": tmp.path().to_str().unwrap(),
                "provider": "file.system",
            }),
        );

        let registry = create_default_registry().with_env(env(&[(
            crate::settings::SETTINGS_ENV_VAR,
            "/does/not/exist.json",
        )]));
        registry.set_settings_path(Some(path));
        assert!(registry.get_instance(None).is_ok());
    }

    #[test]
    fn test_discovery_failures() {
        let registry = create_default_registry().with_env(env(&[]));
        let err = registry.get_instance(None).unwrap_err();
        assert!(matches!(err, Error::ConfigurationMissing(_)));
        assert!(err.is_configuration());

        let conf = TempDir::new().unwrap();
        registry.set_settings_path(Some(conf.path().to_path_buf()));
        assert!(matches!(
            registry.get_instance(None),
            Err(Error::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_discovered_s3_missing_region() {
        let conf = TempDir::new().unwrap();
        let path = write_settings(
            conf.path(),
            serde_json::json!({
                "root": "bucket",
                "tmp": "/tmp/us/",
                "provider": "aws.s3",
                "aws_s3": {
                    "access_key": "ak",
                    "secret_key": "sk",
                    "storage_class": "STANDARD",
                },
            }),
        );
        let registry = create_default_registry().with_env(env(&[]));
        registry.set_settings_path(Some(path));

        let err = registry.get_instance(None).unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
        assert!(err.to_string().contains("s3_region"));
        assert!(err.is_configuration());
        assert!(registry.published(Provider::AwsS3).unwrap().is_none());
    }

    #[test]
    fn test_global_registry_has_file_system() {
        assert!(ProviderRegistry::global().has_provider(Provider::FileSystem));
    }
}
