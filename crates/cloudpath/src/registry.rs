//! Implementation registry and URI scheme dispatch.
//!
//! Every supported scheme has one [`Implementation`] entry describing the
//! provider's path semantics and how to build its default connector. Entries
//! for providers whose connector is not compiled in still exist, flagged with
//! `dependencies_loaded = false`, so naming the scheme works and only using it
//! fails with `MissingDependencies`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use futures::future::BoxFuture;
use rusty_cloudpath_common::SCHEME_SEPARATOR;
use rusty_cloudpath_storage::{StorageBackend, StorageError};

use crate::error::CloudPathError;
use crate::io::StreamReaderFactory;

/// Future producing a connector.
pub type BackendFuture = BoxFuture<'static, Result<Arc<dyn StorageBackend>, StorageError>>;

/// Factory for a provider's default connector.
pub type ConnectorFactory = Arc<dyn Fn() -> BackendFuture + Send + Sync>;

/// Path semantics of a storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Amazon S3 and S3-compatible stores.
    S3,
    /// Azure Blob Storage.
    AzureBlob,
    /// Google Cloud Storage.
    GoogleStorage,
}

impl Provider {
    /// Scheme the provider is registered under by default.
    pub fn default_scheme(&self) -> &'static str {
        match self {
            Provider::S3 => "s3",
            Provider::AzureBlob => "az",
            Provider::GoogleStorage => "gs",
        }
    }

    /// What the provider calls the first path component.
    pub fn drive_label(&self) -> &'static str {
        match self {
            Provider::S3 => "bucket",
            Provider::AzureBlob => "container",
            Provider::GoogleStorage => "bucket",
        }
    }

    /// Whether object keys are case sensitive (drives glob matching).
    pub fn case_sensitive(&self) -> bool {
        match self {
            Provider::S3 | Provider::AzureBlob | Provider::GoogleStorage => true,
        }
    }
}

/// Registry entry for one scheme.
#[derive(Clone)]
pub struct Implementation {
    /// Lowercase scheme without the `://` separator.
    pub scheme: String,
    /// Path semantics.
    pub provider: Provider,
    /// Builds the default connector for this scheme.
    pub connector: Option<ConnectorFactory>,
    /// Whether the connector's dependencies are available.
    pub dependencies_loaded: bool,
    /// Builds streaming readers that bypass the cache; `None` when the
    /// provider has no raw I/O path.
    pub raw_io: Option<StreamReaderFactory>,
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("scheme", &self.scheme)
            .field("provider", &self.provider)
            .field("connector", &self.connector.is_some())
            .field("dependencies_loaded", &self.dependencies_loaded)
            .field("raw_io", &self.raw_io.is_some())
            .finish()
    }
}

impl Implementation {
    /// Entry with a usable connector factory.
    pub fn with_connector<F>(scheme: impl AsRef<str>, provider: Provider, factory: F) -> Self
    where
        F: Fn() -> BackendFuture + Send + Sync + 'static,
    {
        Self {
            scheme: scheme.as_ref().to_ascii_lowercase(),
            provider,
            connector: Some(Arc::new(factory)),
            dependencies_loaded: true,
            raw_io: None,
        }
    }

    /// Attach a streaming-reader factory to this entry.
    pub fn with_raw_io(mut self, factory: StreamReaderFactory) -> Self {
        self.raw_io = Some(factory);
        self
    }

    /// Entry for a provider whose connector is not available in this build.
    pub fn unavailable(scheme: impl AsRef<str>, provider: Provider) -> Self {
        Self {
            scheme: scheme.as_ref().to_ascii_lowercase(),
            provider,
            connector: None,
            dependencies_loaded: false,
            raw_io: None,
        }
    }

    /// Fail with `MissingDependencies` unless this entry can be used.
    pub fn validate_completeness(&self) -> Result<(), CloudPathError> {
        if !self.dependencies_loaded || self.connector.is_none() {
            return Err(CloudPathError::MissingDependencies {
                scheme: self.scheme.clone(),
                message: format!(
                    "no connector is available for {}://; build with the matching \
                     feature or register one",
                    self.scheme
                ),
            });
        }
        Ok(())
    }

    /// Build this entry's default connector.
    pub async fn connect(&self) -> Result<Arc<dyn StorageBackend>, CloudPathError> {
        self.validate_completeness()?;
        match &self.connector {
            Some(factory) => Ok(factory().await?),
            None => Err(CloudPathError::MissingDependencies {
                scheme: self.scheme.clone(),
                message: "no connector factory registered".into(),
            }),
        }
    }
}

static REGISTRY: OnceLock<RwLock<HashMap<String, Implementation>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, Implementation>> {
    REGISTRY.get_or_init(|| {
        let builtins: HashMap<String, Implementation> = builtin_implementations()
            .into_iter()
            .map(|imp: Implementation| (imp.scheme.clone(), imp))
            .collect();
        RwLock::new(builtins)
    })
}

#[cfg(feature = "s3")]
fn s3_implementation() -> Implementation {
    use crate::io::{CloudStreamReader, DEFAULT_STREAM_BUFFER_SIZE};
    use futures::FutureExt;
    use rusty_cloudpath_storage_s3::{S3StorageBackend, StorageSettings};

    Implementation::with_connector("s3", Provider::S3, || {
        async {
            let backend: S3StorageBackend =
                S3StorageBackend::new(StorageSettings::from_env()).await?;
            Ok::<Arc<dyn StorageBackend>, StorageError>(Arc::new(backend))
        }
        .boxed()
    })
    .with_raw_io(CloudStreamReader::factory(DEFAULT_STREAM_BUFFER_SIZE))
}

#[cfg(not(feature = "s3"))]
fn s3_implementation() -> Implementation {
    Implementation::unavailable("s3", Provider::S3)
}

fn builtin_implementations() -> Vec<Implementation> {
    vec![
        s3_implementation(),
        Implementation::unavailable("az", Provider::AzureBlob),
        Implementation::unavailable("gs", Provider::GoogleStorage),
    ]
}

/// Register (or replace) the entry for a scheme.
///
/// Replacing an entry also drops the scheme's default client, so the next
/// default lookup builds one from the new entry.
///
/// # Returns
/// The entry previously registered under the scheme, if any.
pub fn register(implementation: Implementation) -> Option<Implementation> {
    let scheme: String = implementation.scheme.to_ascii_lowercase();
    let previous: Option<Implementation> = registry()
        .write()
        .unwrap()
        .insert(scheme.clone(), implementation);

    crate::client::forget_default(&scheme);
    log::debug!("Registered cloud implementation for {}://", scheme);
    previous
}

/// Look up the entry for a scheme (case-insensitive).
///
/// # Errors
/// Returns `InvalidPrefix` when no entry exists.
pub fn lookup(scheme: &str) -> Result<Implementation, CloudPathError> {
    registry()
        .read()
        .unwrap()
        .get(&scheme.to_ascii_lowercase())
        .cloned()
        .ok_or_else(|| CloudPathError::InvalidPrefix {
            uri: format!("{}{}", scheme, SCHEME_SEPARATOR),
        })
}

/// Flip the dependency flag of a registered scheme.
pub fn set_dependencies_loaded(scheme: &str, loaded: bool) -> Result<(), CloudPathError> {
    let mut implementations = registry().write().unwrap();
    match implementations.get_mut(&scheme.to_ascii_lowercase()) {
        Some(implementation) => {
            implementation.dependencies_loaded = loaded;
            Ok(())
        }
        None => Err(CloudPathError::InvalidPrefix {
            uri: format!("{}{}", scheme, SCHEME_SEPARATOR),
        }),
    }
}

/// Every registered scheme, sorted.
pub fn registered_schemes() -> Vec<String> {
    let mut schemes: Vec<String> = registry().read().unwrap().keys().cloned().collect();
    schemes.sort();
    schemes
}

/// Split `scheme://rest` into its scheme and remainder.
pub(crate) fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let idx: usize = uri.find(SCHEME_SEPARATOR)?;
    let scheme: &str = &uri[..idx];
    if scheme.is_empty() {
        return None;
    }
    Some((scheme, &uri[idx + SCHEME_SEPARATOR.len()..]))
}

/// Pick the entry whose scheme prefixes the URI (case-insensitive).
///
/// # Errors
/// Returns `InvalidPrefix` when no registered scheme matches.
pub fn dispatch(uri: &str) -> Result<Implementation, CloudPathError> {
    let invalid = || CloudPathError::InvalidPrefix {
        uri: uri.to_string(),
    };
    let (scheme, _) = split_scheme(uri).ok_or_else(invalid)?;
    lookup(scheme).map_err(|_| invalid())
}
