//! Integration tests for scheme registration, dispatch and default clients.
//!
//! The registry is process-wide, so every test registers its own scheme.

use std::sync::Arc;

use futures::FutureExt;
use rusty_cloudpath::registry::{self, BackendFuture};
use rusty_cloudpath::{
    AnyPath, Client, CloudPath, CloudPathError, Implementation, MemoryBackend, Provider,
    StorageBackend, StorageError,
};

/// Register `scheme` with a connector that always hands out `backend`.
fn register_memory(scheme: &str, backend: Arc<MemoryBackend>) -> Option<Implementation> {
    registry::register(Implementation::with_connector(
        scheme,
        Provider::S3,
        move || -> BackendFuture {
            let backend: Arc<MemoryBackend> = backend.clone();
            async move { Ok::<Arc<dyn StorageBackend>, StorageError>(backend) }.boxed()
        },
    ))
}

#[tokio::test]
async fn test_from_uri_uses_registered_connector() {
    let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    backend.put_object("bucket", "hello.txt", b"hi".to_vec());
    register_memory("memtest", backend.clone());

    let path: CloudPath = CloudPath::from_uri("MemTest://bucket/hello.txt").await.unwrap();
    assert_eq!(path.as_uri(), "memtest://bucket/hello.txt");
    assert_eq!(path.read_text().await.unwrap(), "hi");
    assert_eq!(backend.download_count(), 1);
}

#[tokio::test]
async fn test_default_client_is_shared() {
    register_memory("shared", Arc::new(MemoryBackend::new()));

    let first: Client = Client::get_or_create_default("shared").await.unwrap();
    let second: Client = Client::get_or_create_default("SHARED").await.unwrap();
    assert!(first.same_client(&second));

    let a: CloudPath = CloudPath::from_uri("shared://bucket/a").await.unwrap();
    assert!(a.client().same_client(&first));
}

#[tokio::test]
async fn test_reregister_replaces_default_client() {
    let old: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    old.put_object("bucket", "k.txt", b"old".to_vec());
    assert!(register_memory("swap", old).is_none());
    let before: Client = Client::get_or_create_default("swap").await.unwrap();

    let new: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    new.put_object("bucket", "k.txt", b"new".to_vec());
    assert!(register_memory("swap", new).is_some());

    let after: Client = Client::get_or_create_default("swap").await.unwrap();
    assert!(!after.same_client(&before));
    let path: CloudPath = CloudPath::from_uri("swap://bucket/k.txt").await.unwrap();
    assert_eq!(path.read_text().await.unwrap(), "new");
}

#[tokio::test]
async fn test_set_and_clear_default() {
    register_memory("custom", Arc::new(MemoryBackend::new()));
    let client: Client = Client::builder(Provider::S3, Arc::new(MemoryBackend::new()))
        .scheme("custom")
        .build()
        .unwrap();
    client.set_as_default();

    let path: CloudPath = CloudPath::from_uri("custom://bucket/x").await.unwrap();
    assert!(path.client().same_client(&client));

    Client::clear_default("custom");
    let path: CloudPath = CloudPath::from_uri("custom://bucket/x").await.unwrap();
    assert!(!path.client().same_client(&client));
}

#[tokio::test]
async fn test_unknown_scheme_is_invalid_prefix() {
    let err: CloudPathError = CloudPath::from_uri("nosuch://bucket/key").await.unwrap_err();
    assert!(matches!(err, CloudPathError::InvalidPrefix { .. }));
    assert!(err.is_dispatch_error());
}

#[tokio::test]
async fn test_unavailable_provider_is_missing_dependencies() {
    for uri in ["az://container/blob", "gs://bucket/object"] {
        let err: CloudPathError = CloudPath::from_uri(uri).await.unwrap_err();
        assert!(matches!(err, CloudPathError::MissingDependencies { .. }));
    }
}

#[tokio::test]
async fn test_dependency_flag_gates_use() {
    register_memory("gated", Arc::new(MemoryBackend::new()));
    registry::set_dependencies_loaded("gated", false).unwrap();
    assert!(matches!(
        CloudPath::from_uri("gated://bucket/k").await,
        Err(CloudPathError::MissingDependencies { .. })
    ));

    registry::set_dependencies_loaded("gated", true).unwrap();
    assert!(CloudPath::from_uri("gated://bucket/k").await.is_ok());
    assert!(registry::set_dependencies_loaded("never-registered", true).is_err());
}

#[tokio::test]
async fn test_client_rejects_foreign_scheme() {
    let client: Client = Client::new(Provider::S3, Arc::new(MemoryBackend::new())).unwrap();
    assert!(matches!(
        client.path("gs://bucket/key"),
        Err(CloudPathError::ClientMismatch { .. })
    ));
}

#[tokio::test]
async fn test_anypath_dispatch() {
    register_memory("anyp", Arc::new(MemoryBackend::new()));
    let cloud: AnyPath = AnyPath::parse("anyp://bucket/file").await.unwrap();
    assert_eq!(cloud.as_cloud().unwrap().as_uri(), "anyp://bucket/file");

    let local: AnyPath = AnyPath::parse("relative/file.txt").await.unwrap();
    assert!(local.as_local().is_some());
}
