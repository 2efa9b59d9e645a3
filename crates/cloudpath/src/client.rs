//! Clients: one connector, one cache root, one cache-lifetime policy.
//!
//! A [`Client`] is a cheap handle around shared state. Every path built from
//! it keeps that state alive, so the cache root outlives the last path that
//! uses it. Default clients (one per scheme) live in a process-wide map with
//! explicit accessors.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use rusty_cloudpath_common::TEMP_CACHE_DIR_PREFIX;
use rusty_cloudpath_storage::{ObjectLocation, StorageBackend};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::CloudPathError;
use crate::io::StreamReaderFactory;
use crate::options::{CacheMode, EnvDefaults};
use crate::path::CloudPath;
use crate::registry::{self, Implementation, Provider};

/// Where the cache root came from.
enum CacheRoot {
    /// Allocated in the OS temp directory; removed with the client.
    Owned(TempDir),
    /// Supplied by the caller or the environment.
    Explicit(PathBuf),
}

impl CacheRoot {
    fn path(&self) -> &Path {
        match self {
            CacheRoot::Owned(dir) => dir.path(),
            CacheRoot::Explicit(path) => path,
        }
    }
}

pub(crate) struct ClientInner {
    pub(crate) scheme: String,
    pub(crate) provider: Provider,
    pub(crate) backend: Arc<dyn StorageBackend>,
    cache_root: CacheRoot,
    pub(crate) cache_mode: CacheMode,
    pub(crate) force_overwrite_from_cloud: bool,
    pub(crate) force_overwrite_to_cloud: bool,
    /// Mirrors opened for write and not yet pushed.
    pub(crate) dirty: Mutex<HashSet<PathBuf>>,
    /// Per-mirror locks serializing refreshes.
    pub(crate) mirror_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    pub(crate) raw_io: Option<StreamReaderFactory>,
}

impl ClientInner {
    pub(crate) fn cache_root(&self) -> &Path {
        self.cache_root.path()
    }

    /// Delete every mirror under the root that has no pending writes.
    ///
    /// Best effort: failures are logged and skipped.
    pub(crate) fn clear_mirrors_under(&self, dir: &Path) {
        if !dir.exists() {
            return;
        }
        if dir.is_file() {
            self.remove_mirror(dir);
            return;
        }

        let dirty: HashSet<PathBuf> = self.dirty.lock().unwrap().clone();
        for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to walk cache directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                // Non-empty directories still hold dirty mirrors.
                let _ = std::fs::remove_dir(entry.path());
            } else if !dirty.contains(entry.path()) {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    log::warn!("Failed to remove cached file {}: {}", entry.path().display(), e);
                }
            }
        }
    }

    /// Delete one mirror file unless it has pending writes.
    pub(crate) fn remove_mirror(&self, mirror: &Path) {
        if self.dirty.lock().unwrap().contains(mirror) {
            log::debug!("Keeping dirty mirror {}", mirror.display());
            return;
        }
        match std::fs::remove_file(mirror) {
            Ok(()) => log::debug!("Evicted mirror {}", mirror.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove mirror {}: {}", mirror.display(), e),
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        match (&self.cache_root, self.cache_mode) {
            (CacheRoot::Owned(dir), _) => {
                log::debug!("Removing owned cache root {}", dir.path().display());
            }
            (CacheRoot::Explicit(_), CacheMode::Persistent) => {}
            (CacheRoot::Explicit(root), CacheMode::TmpDir) => {
                let root: PathBuf = root.clone();
                self.clear_mirrors_under(&root);
                // Only goes away when nothing dirty is left inside.
                let _ = std::fs::remove_dir(&root);
            }
            (CacheRoot::Explicit(root), _) => {
                let root: PathBuf = root.clone();
                self.clear_mirrors_under(&root);
            }
        }
    }
}

/// Handle to a connector plus its local cache.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("scheme", &self.inner.scheme)
            .field("provider", &self.inner.provider)
            .field("cache_root", &self.inner.cache_root())
            .field("cache_mode", &self.inner.cache_mode)
            .finish()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    provider: Provider,
    backend: Arc<dyn StorageBackend>,
    scheme: Option<String>,
    cache_root: Option<PathBuf>,
    cache_mode: Option<CacheMode>,
    force_overwrite_from_cloud: Option<bool>,
    force_overwrite_to_cloud: Option<bool>,
    read_process_env: bool,
    env: Option<EnvDefaults>,
    raw_io: Option<StreamReaderFactory>,
}

impl ClientBuilder {
    /// Scheme this client serves. Defaults to the provider's scheme.
    pub fn scheme(mut self, scheme: impl AsRef<str>) -> Self {
        self.scheme = Some(scheme.as_ref().to_ascii_lowercase());
        self
    }

    /// Local directory holding mirrors. A temporary directory is allocated
    /// (and owned) when none is configured.
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// When mirrors are deleted.
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    /// Always re-download on read, discarding local divergence.
    pub fn force_overwrite_from_cloud(mut self, force: bool) -> Self {
        self.force_overwrite_from_cloud = Some(force);
        self
    }

    /// Always upload on write, even over a newer cloud copy.
    pub fn force_overwrite_to_cloud(mut self, force: bool) -> Self {
        self.force_overwrite_to_cloud = Some(force);
        self
    }

    /// Enable streaming reads that bypass the cache.
    pub fn raw_io(mut self, factory: StreamReaderFactory) -> Self {
        self.raw_io = Some(factory);
        self
    }

    /// Fill unset values from the process environment.
    pub fn with_env_defaults(mut self) -> Self {
        self.read_process_env = true;
        self
    }

    /// Fill unset values from already-collected defaults.
    pub fn with_env(mut self, env: EnvDefaults) -> Self {
        self.env = Some(env);
        self
    }

    /// Create the client.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for `persistent` mode without a cache
    /// root or for a bad environment value, and `Io` when the cache root cannot
    /// be created.
    pub fn build(self) -> Result<Client, CloudPathError> {
        let env: EnvDefaults = match self.env {
            Some(env) => env,
            None if self.read_process_env => EnvDefaults::from_env()?,
            None => EnvDefaults::default(),
        };

        let root: Option<PathBuf> = self.cache_root.or(env.cache_root);
        let cache_mode: CacheMode = match self.cache_mode.or(env.cache_mode) {
            Some(mode) => mode,
            None if root.is_some() => CacheMode::Persistent,
            None => CacheMode::TmpDir,
        };

        let cache_root: CacheRoot = match root {
            Some(root) => {
                std::fs::create_dir_all(&root).map_err(|e| CloudPathError::io(&root, e))?;
                CacheRoot::Explicit(root)
            }
            None if cache_mode == CacheMode::Persistent => {
                return Err(CloudPathError::InvalidConfiguration {
                    message: "persistent cache mode requires an explicit cache root".into(),
                });
            }
            None => {
                let dir: TempDir = tempfile::Builder::new()
                    .prefix(TEMP_CACHE_DIR_PREFIX)
                    .tempdir()
                    .map_err(|e| CloudPathError::io(std::env::temp_dir(), e))?;
                CacheRoot::Owned(dir)
            }
        };

        let scheme: String = self
            .scheme
            .unwrap_or_else(|| self.provider.default_scheme().to_string());

        log::debug!(
            "Created {}:// client with {} cache at {}",
            scheme,
            cache_mode,
            cache_root.path().display()
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                scheme,
                provider: self.provider,
                backend: self.backend,
                cache_root,
                cache_mode,
                force_overwrite_from_cloud: self
                    .force_overwrite_from_cloud
                    .unwrap_or(env.force_overwrite_from_cloud),
                force_overwrite_to_cloud: self
                    .force_overwrite_to_cloud
                    .unwrap_or(env.force_overwrite_to_cloud),
                dirty: Mutex::new(HashSet::new()),
                mirror_locks: Mutex::new(HashMap::new()),
                raw_io: self.raw_io,
            }),
        })
    }
}

static DEFAULT_CLIENTS: OnceLock<Mutex<HashMap<String, Client>>> = OnceLock::new();

fn default_clients() -> &'static Mutex<HashMap<String, Client>> {
    DEFAULT_CLIENTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Drop the default client of a scheme (used when the scheme is re-registered).
pub(crate) fn forget_default(scheme: &str) {
    default_clients()
        .lock()
        .unwrap()
        .remove(&scheme.to_ascii_lowercase());
}

impl Client {
    /// Start building a client around a connector.
    pub fn builder(provider: Provider, backend: Arc<dyn StorageBackend>) -> ClientBuilder {
        ClientBuilder {
            provider,
            backend,
            scheme: None,
            cache_root: None,
            cache_mode: None,
            force_overwrite_from_cloud: None,
            force_overwrite_to_cloud: None,
            read_process_env: false,
            env: None,
            raw_io: None,
        }
    }

    /// Client with a temporary cache root and default settings.
    pub fn new(provider: Provider, backend: Arc<dyn StorageBackend>) -> Result<Self, CloudPathError> {
        Self::builder(provider, backend).build()
    }

    /// Build a client for a registry entry using its connector and the
    /// environment defaults.
    pub async fn from_implementation(implementation: &Implementation) -> Result<Self, CloudPathError> {
        let backend: Arc<dyn StorageBackend> = implementation.connect().await?;
        let mut builder: ClientBuilder = Self::builder(implementation.provider, backend)
            .scheme(&implementation.scheme)
            .with_env_defaults();
        if let Some(factory) = &implementation.raw_io {
            builder = builder.raw_io(Arc::clone(factory));
        }
        builder.build()
    }

    /// The process-wide default client of a scheme, created on first use.
    ///
    /// # Errors
    /// Returns `InvalidPrefix` for unknown schemes and `MissingDependencies`
    /// when the scheme has no usable connector.
    pub async fn get_or_create_default(scheme: &str) -> Result<Self, CloudPathError> {
        let scheme: String = scheme.to_ascii_lowercase();
        if let Some(client) = default_clients().lock().unwrap().get(&scheme) {
            return Ok(client.clone());
        }

        let implementation: Implementation = registry::lookup(&scheme)?;
        let client: Client = Self::from_implementation(&implementation).await?;

        // Another task may have won the race while the connector was built.
        let mut clients = default_clients().lock().unwrap();
        Ok(clients.entry(scheme).or_insert(client).clone())
    }

    /// Make this client the default for its scheme.
    pub fn set_as_default(&self) {
        default_clients()
            .lock()
            .unwrap()
            .insert(self.inner.scheme.clone(), self.clone());
    }

    /// Forget the default client of a scheme.
    pub fn clear_default(scheme: &str) {
        forget_default(scheme);
    }

    /// Build a path handle for a URI served by this client.
    ///
    /// # Errors
    /// Returns `InvalidPrefix` when the URI has no scheme, `ClientMismatch`
    /// when it has another client's scheme, and `InvalidPath` when it has no
    /// drive.
    pub fn path(&self, uri: &str) -> Result<CloudPath, CloudPathError> {
        CloudPath::with_client(self.clone(), uri)
    }

    /// Scheme served by this client.
    pub fn scheme(&self) -> &str {
        &self.inner.scheme
    }

    /// Path semantics of the provider.
    pub fn provider(&self) -> Provider {
        self.inner.provider
    }

    /// The connector.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.inner.backend
    }

    /// Local cache root.
    pub fn cache_root(&self) -> &Path {
        self.inner.cache_root()
    }

    /// Cache-lifetime policy.
    pub fn cache_mode(&self) -> CacheMode {
        self.inner.cache_mode
    }

    /// Whether the cache root was allocated by (and dies with) this client.
    pub fn owns_cache_root(&self) -> bool {
        matches!(self.inner.cache_root, CacheRoot::Owned(_))
    }

    /// Whether both handles refer to the same client.
    pub fn same_client(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Mirror location of an object inside the cache root.
    pub fn mirror_path(&self, location: &ObjectLocation) -> PathBuf {
        let mut path: PathBuf = self.cache_root().join(&location.drive);
        for part in location.key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Whether streaming reads are available.
    pub fn supports_raw_io(&self) -> bool {
        self.inner.raw_io.is_some()
    }

    /// Whether a mirror has pending writes.
    pub fn is_dirty(&self, mirror: &Path) -> bool {
        self.inner.dirty.lock().unwrap().contains(mirror)
    }

    /// Delete every mirror under the cache root, keeping the root.
    ///
    /// Mirrors with pending writes are kept. Clearing an empty cache is fine.
    pub fn clear_cache(&self) {
        let root: PathBuf = self.cache_root().to_path_buf();
        self.inner.clear_mirrors_under(&root);
    }
}
