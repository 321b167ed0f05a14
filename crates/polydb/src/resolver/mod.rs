//! Driver resolution.
//!
//! A [`DriverResolver`] turns a [`DbType`] into the host's
//! [`ConnectionFactory`]. Resolution order:
//!
//! 1. a constructor registered with [`DriverResolver::register_driver`]
//! 2. a plugin module in the plugin directory, tried under every candidate
//!    name from [`Platform::candidates`] and loaded by a [`ModuleLoader`]
//!
//! When no candidate loads, a corrupt copy of the bare module is deleted
//! and, if a [`ModuleFetcher`] is configured, the module is downloaded and
//! the candidates are tried once more.
//!
//! Resolved factories are cached per backend. Concurrent first resolutions
//! may each build a factory; only the first one inserted is kept.

mod platform;

pub use platform::Platform;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::DbType;
use crate::core::traits::ConnectionFactory;
use crate::error::{DbError, Result};

/// Builds a factory for a statically linked driver.
pub type DriverConstructor = fn() -> Arc<dyn ConnectionFactory>;

/// Loads a driver module file.
///
/// polydb ships no implementation. The host supplies one through
/// [`DriverResolver::with_loader`], typically wrapping its own plugin
/// mechanism (a dynamic-library symbol lookup, a WASM runtime, a manifest of
/// bundled drivers). Without a loader only registered constructors resolve.
pub trait ModuleLoader: Send + Sync {
    /// File extension of module files, without the dot.
    fn extension(&self) -> &str {
        "dll"
    }

    /// Load the factory for `db_type` from an existing module file.
    ///
    /// An error means the file exists but is not a usable module.
    fn load(&self, db_type: DbType, path: &Path) -> Result<Arc<dyn ConnectionFactory>>;
}

/// Downloads a missing driver module into the plugin directory.
///
/// Host supplied through [`DriverResolver::with_fetcher`]. The fetcher only
/// writes the file; the configured [`ModuleLoader`] loads it afterwards.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Write the module `name` to `destination`.
    async fn fetch(&self, name: &str, destination: &Path) -> Result<()>;
}

/// Resolves and caches connection factories.
pub struct DriverResolver {
    constructors: RwLock<HashMap<DbType, DriverConstructor>>,
    cache: RwLock<HashMap<DbType, Arc<dyn ConnectionFactory>>>,
    insert_lock: Mutex<()>,
    plugin_dir: PathBuf,
    platform: Platform,
    loader: Option<Arc<dyn ModuleLoader>>,
    fetcher: Option<Arc<dyn ModuleFetcher>>,
}

static GLOBAL: OnceLock<DriverResolver> = OnceLock::new();

impl DriverResolver {
    /// Resolver with no plugin support: only registered constructors resolve.
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            insert_lock: Mutex::new(()),
            plugin_dir: plugin_dir.into(),
            platform: Platform::current(),
            loader: None,
            fetcher: None,
        }
    }

    /// Process-wide resolver using `./plugins` as its plugin directory.
    pub fn global() -> &'static DriverResolver {
        GLOBAL.get_or_init(|| DriverResolver::new("plugins"))
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Register a statically linked driver. Takes precedence over plugins.
    pub fn register_driver(&self, db_type: DbType, constructor: DriverConstructor) {
        if let Ok(mut constructors) = self.constructors.write() {
            constructors.insert(db_type, constructor);
            debug!("Registered driver constructor for {}", db_type);
        }
    }

    /// Candidate module paths for a backend, in lookup order.
    pub fn candidate_paths(&self, db_type: DbType) -> Vec<PathBuf> {
        let ext = self
            .loader
            .as_ref()
            .map(|l| l.extension().to_string())
            .unwrap_or_else(|| "dll".to_string());
        self.platform
            .candidates(db_type.driver_module())
            .into_iter()
            .map(|name| self.plugin_dir.join(format!("{}.{}", name, ext)))
            .collect()
    }

    /// Resolve the connection factory for a backend.
    pub async fn resolve(&self, db_type: DbType) -> Result<Arc<dyn ConnectionFactory>> {
        if let Some(factory) = self.cached(db_type) {
            return Ok(factory);
        }

        let constructor = self
            .constructors
            .read()
            .ok()
            .and_then(|c| c.get(&db_type).copied());
        let factory = match constructor {
            Some(constructor) => constructor(),
            None => self.load_plugin(db_type).await?,
        };
        Ok(self.insert(db_type, factory))
    }

    /// Forget every resolved factory.
    pub fn reset(&self) {
        let _guard = self.insert_lock.lock();
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn cached(&self, db_type: DbType) -> Option<Arc<dyn ConnectionFactory>> {
        self.cache.read().ok().and_then(|c| c.get(&db_type).cloned())
    }

    fn insert(&self, db_type: DbType, factory: Arc<dyn ConnectionFactory>) -> Arc<dyn ConnectionFactory> {
        let _guard = self.insert_lock.lock();
        match self.cache.write() {
            Ok(mut cache) => cache.entry(db_type).or_insert(factory).clone(),
            Err(_) => factory,
        }
    }

    async fn load_plugin(&self, db_type: DbType) -> Result<Arc<dyn ConnectionFactory>> {
        let bare = self.bare_path(db_type);
        let missing = || DbError::MissingDriver {
            backend: db_type.to_string(),
            path: bare.display().to_string(),
        };
        let loader = self.loader.as_ref().ok_or_else(missing)?;

        if let Some(factory) = self.try_candidates(loader.as_ref(), db_type) {
            return Ok(factory);
        }

        if bare.exists() {
            warn!("Deleting unusable driver module {}", bare.display());
            std::fs::remove_file(&bare)?;
        }

        let fetcher = self.fetcher.as_ref().ok_or_else(missing)?;
        if let Some(parent) = bare.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Downloading driver module {} to {}", db_type.driver_module(), bare.display());
        fetcher.fetch(db_type.driver_module(), &bare).await?;

        self.try_candidates(loader.as_ref(), db_type)
            .ok_or_else(missing)
    }

    fn try_candidates(&self, loader: &dyn ModuleLoader, db_type: DbType) -> Option<Arc<dyn ConnectionFactory>> {
        for path in self.candidate_paths(db_type) {
            if !path.exists() {
                continue;
            }
            match loader.load(db_type, &path) {
                Ok(factory) => {
                    info!("Loaded {} driver from {}", db_type, path.display());
                    return Some(factory);
                }
                Err(e) => debug!("Cannot load {}: {}", path.display(), e),
            }
        }
        None
    }

    fn bare_path(&self, db_type: DbType) -> PathBuf {
        self.candidate_paths(db_type)
            .pop()
            .unwrap_or_else(|| self.plugin_dir.join(db_type.driver_module()))
    }
}

impl std::fmt::Debug for DriverResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached: Vec<DbType> = self
            .cache
            .read()
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("DriverResolver")
            .field("plugin_dir", &self.plugin_dir)
            .field("platform", &self.platform)
            .field("cached", &cached)
            .finish()
    }
}

/// Register a statically linked driver with the process-wide resolver.
pub fn register_driver(db_type: DbType, constructor: DriverConstructor) {
    DriverResolver::global().register_driver(db_type, constructor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Connection;
    use crate::error::DriverError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullFactory(DbType);

    #[async_trait]
    impl ConnectionFactory for NullFactory {
        fn db_type(&self) -> DbType {
            self.0
        }

        async fn connect(&self, _cs: &str) -> std::result::Result<Box<dyn Connection>, DriverError> {
            Err(DriverError::new("not connected"))
        }
    }

    /// Accepts files whose content is `ok`.
    struct FileLoader;

    impl ModuleLoader for FileLoader {
        fn load(&self, db_type: DbType, path: &Path) -> Result<Arc<dyn ConnectionFactory>> {
            if std::fs::read_to_string(path)? == "ok" {
                Ok(Arc::new(NullFactory(db_type)))
            } else {
                Err(DbError::Config(format!("corrupt module {}", path.display())))
            }
        }
    }

    struct CountingFetcher {
        calls: AtomicUsize,
        content: &'static str,
    }

    #[async_trait]
    impl ModuleFetcher for CountingFetcher {
        async fn fetch(&self, _name: &str, destination: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(destination, self.content)?;
            Ok(())
        }
    }

    fn sqlite_factory() -> Arc<dyn ConnectionFactory> {
        Arc::new(NullFactory(DbType::Sqlite))
    }

    fn resolver(dir: &Path) -> DriverResolver {
        DriverResolver::new(dir)
            .with_platform(Platform::new("linux", "x64", (8, 0)))
            .with_loader(Arc::new(FileLoader))
    }

    #[tokio::test]
    async fn test_registered_constructor_wins() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        resolver.register_driver(DbType::Sqlite, sqlite_factory);

        let first = resolver.resolve(DbType::Sqlite).await.unwrap();
        let second = resolver.resolve(DbType::Sqlite).await.unwrap();
        assert_eq!(first.db_type(), DbType::Sqlite);
        assert!(Arc::ptr_eq(&first, &second));

        resolver.reset();
        let third = resolver.resolve(DbType::Sqlite).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_most_specific_candidate_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Npgsql_net60.dll"), "ok").unwrap();
        std::fs::write(dir.path().join("Npgsql.dll"), "broken").unwrap();

        let factory = resolver(dir.path()).resolve(DbType::PostgreSql).await.unwrap();
        assert_eq!(factory.db_type(), DbType::PostgreSql);
        assert!(dir.path().join("Npgsql.dll").exists());
    }

    #[tokio::test]
    async fn test_missing_driver_names_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = match resolver(dir.path()).resolve(DbType::MySql).await {
            Err(e) => e,
            Ok(_) => panic!("resolved without a module"),
        };
        match err {
            DbError::MissingDriver { backend, path } => {
                assert_eq!(backend, "mysql");
                assert!(path.ends_with("MySqlConnector.dll"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_module_is_replaced_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("DmProvider.dll"), "broken").unwrap();
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            content: "ok",
        });
        let resolver = resolver(dir.path()).with_fetcher(fetcher.clone());

        let factory = resolver.resolve(DbType::DaMeng).await.unwrap();
        assert_eq!(factory.db_type(), DbType::DaMeng);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("DmProvider.dll")).unwrap(),
            "ok"
        );
    }

    #[tokio::test]
    async fn test_bad_download_is_missing_driver() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            content: "still broken",
        });
        let resolver = resolver(dir.path()).with_fetcher(fetcher.clone());
        assert!(matches!(
            resolver.resolve(DbType::Iris).await,
            Err(DbError::MissingDriver { .. })
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_candidate_paths_use_loader_extension() {
        let dir = tempfile::tempdir().unwrap();
        let paths = resolver(dir.path()).candidate_paths(DbType::Sqlite);
        assert_eq!(
            paths[0],
            dir.path().join("Microsoft.Data.Sqlite.linux-x64.dll")
        );
        assert_eq!(paths.last().unwrap(), &dir.path().join("Microsoft.Data.Sqlite.dll"));
    }
}
