//! Integration tests for cache-lifetime policies.
//!
//! Covers when mirrors disappear under each cache mode and what happens to
//! the cache root when a client is dropped.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rusty_cloudpath::{
    CacheMode, Client, CloudPath, CloudPathError, CloudWriter, EnvDefaults, MemoryBackend,
    OpenMode, Provider,
};
use tempfile::TempDir;

fn backend_with(keys: &[&str]) -> Arc<MemoryBackend> {
    let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    for key in keys {
        backend.put_object("bucket", key, format!("content of {}", key));
    }
    backend
}

fn client(backend: Arc<MemoryBackend>, root: Option<PathBuf>, mode: Option<CacheMode>) -> Client {
    let mut builder = Client::builder(Provider::S3, backend);
    if let Some(root) = root {
        builder = builder.cache_root(root);
    }
    if let Some(mode) = mode {
        builder = builder.cache_mode(mode);
    }
    builder.build().unwrap()
}

// =============================================================================
// CONFIGURATION TESTS
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_default_is_owned_tmp_dir() {
        let client: Client = client(backend_with(&[]), None, None);
        assert_eq!(client.cache_mode(), CacheMode::TmpDir);
        assert!(client.owns_cache_root());
    }

    #[test]
    fn test_persistent_requires_root() {
        let result = Client::builder(Provider::S3, backend_with(&[]))
            .cache_mode(CacheMode::Persistent)
            .build();
        assert!(matches!(
            result,
            Err(CloudPathError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_env_mode_and_root() {
        let dir: TempDir = TempDir::new().unwrap();
        let env: EnvDefaults = EnvDefaults::from_lookup(|name: &str| match name {
            "CLOUDPATH_LOCAL_CACHE_DIR" => Some(dir.path().join("env").display().to_string()),
            "CLOUDPATH_FILE_CACHE_MODE" => Some("object_scoped".to_string()),
            _ => None,
        })
        .unwrap();

        let client: Client = Client::builder(Provider::S3, backend_with(&[]))
            .with_env(env)
            .build()
            .unwrap();
        assert_eq!(client.cache_mode(), CacheMode::ObjectScoped);
        assert_eq!(client.cache_root(), dir.path().join("env"));
    }

    #[test]
    fn test_explicit_mode_beats_env() {
        let env: EnvDefaults = EnvDefaults {
            cache_mode: Some(CacheMode::CloseOnFile),
            ..EnvDefaults::default()
        };
        let client: Client = Client::builder(Provider::S3, backend_with(&[]))
            .cache_mode(CacheMode::TmpDir)
            .with_env(env)
            .build()
            .unwrap();
        assert_eq!(client.cache_mode(), CacheMode::TmpDir);
    }
}

// =============================================================================
// CLIENT DROP TESTS
// =============================================================================

mod client_drop {
    use super::*;

    #[tokio::test]
    async fn test_owned_root_removed() {
        let client: Client = client(backend_with(&["a.txt"]), None, None);
        let path: CloudPath = client.path("s3://bucket/a.txt").unwrap();
        path.read_bytes().await.unwrap();
        let root: PathBuf = client.cache_root().to_path_buf();

        drop(path);
        drop(client);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_paths_keep_client_alive() {
        let client: Client = client(backend_with(&["a.txt"]), None, None);
        let path: CloudPath = client.path("s3://bucket/a.txt").unwrap();
        let root: PathBuf = client.cache_root().to_path_buf();
        drop(client);

        assert_eq!(path.read_text().await.unwrap(), "content of a.txt");
        assert!(root.is_dir());
        drop(path);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_persistent_root_untouched() {
        let dir: TempDir = TempDir::new().unwrap();
        let root: PathBuf = dir.path().join("cache");
        let client: Client = client(backend_with(&["a.txt"]), Some(root.clone()), None);
        assert_eq!(client.cache_mode(), CacheMode::Persistent);

        let path: CloudPath = client.path("s3://bucket/a.txt").unwrap();
        path.read_bytes().await.unwrap();
        let mirror: PathBuf = path.local_cache_path().to_path_buf();

        drop(path);
        drop(client);
        assert!(mirror.is_file());
    }

    #[tokio::test]
    async fn test_explicit_tmp_dir_root_removed() {
        let dir: TempDir = TempDir::new().unwrap();
        let root: PathBuf = dir.path().join("cache");
        let client: Client =
            client(backend_with(&["a/b.txt"]), Some(root.clone()), Some(CacheMode::TmpDir));
        client.path("s3://bucket/a/b.txt").unwrap().read_bytes().await.unwrap();
        assert!(root.join("bucket").join("a").join("b.txt").is_file());

        drop(client);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_explicit_object_scoped_root_kept_empty() {
        let dir: TempDir = TempDir::new().unwrap();
        let root: PathBuf = dir.path().join("cache");
        let client: Client = client(
            backend_with(&["a.txt"]),
            Some(root.clone()),
            Some(CacheMode::ObjectScoped),
        );
        let path: CloudPath = client.path("s3://bucket/a.txt").unwrap();
        path.read_bytes().await.unwrap();
        let mirror: PathBuf = path.local_cache_path().to_path_buf();

        // Another value keeps the mirror alive past the first one.
        let kept: CloudPath = path.clone();
        drop(path);
        assert!(mirror.is_file());

        drop(kept);
        drop(client);
        assert!(!mirror.exists());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_dirty_mirror_survives_drop() {
        let dir: TempDir = TempDir::new().unwrap();
        let root: PathBuf = dir.path().join("cache");
        let backend: Arc<MemoryBackend> = backend_with(&["pending.txt"]);
        let client: Client =
            client(backend.clone(), Some(root.clone()), Some(CacheMode::TmpDir));
        let path: CloudPath = client.path("s3://bucket/pending.txt").unwrap();

        let mut writer: CloudWriter = path.open_write(OpenMode::Write).await.unwrap();
        writer.write_all(b"unsaved").unwrap();
        let mirror: PathBuf = writer.local_path().to_path_buf();

        // The remote moves on, so the push is refused and the mirror stays dirty.
        let later: SystemTime = SystemTime::now() + Duration::from_secs(3600);
        backend.put_object_at("bucket", "pending.txt", b"theirs".to_vec(), later);
        assert!(writer.close().await.is_err());

        drop(path);
        drop(client);
        assert_eq!(std::fs::read(&mirror).unwrap(), b"unsaved");
        assert!(root.is_dir());
    }
}

// =============================================================================
// OBJECT-SCOPED TESTS
// =============================================================================

mod object_scoped {
    use super::*;

    #[tokio::test]
    async fn test_mirror_removed_with_path_value() {
        let backend: Arc<MemoryBackend> = backend_with(&["a.txt"]);
        let client: Client = client(backend, None, Some(CacheMode::ObjectScoped));
        let path: CloudPath = client.path("s3://bucket/a.txt").unwrap();
        path.read_bytes().await.unwrap();
        let mirror: PathBuf = path.local_cache_path().to_path_buf();
        assert!(mirror.is_file());

        drop(path);
        assert!(!mirror.exists());
        assert!(client.cache_root().is_dir());
    }
}

// =============================================================================
// CLEAR CACHE TESTS
// =============================================================================

mod clear_cache {
    use super::*;

    #[tokio::test]
    async fn test_clear_path_and_client_cache() {
        let backend: Arc<MemoryBackend> = backend_with(&["a/1.txt", "a/2.txt", "b.txt"]);
        let client: Client = client(backend.clone(), None, None);

        for uri in ["s3://bucket/a/1.txt", "s3://bucket/a/2.txt", "s3://bucket/b.txt"] {
            client.path(uri).unwrap().read_bytes().await.unwrap();
        }

        let dir: CloudPath = client.path("s3://bucket/a").unwrap();
        dir.clear_cache();
        assert!(!dir.local_cache_path().join("1.txt").exists());
        assert!(client.path("s3://bucket/b.txt").unwrap().local_cache_path().is_file());

        client.clear_cache();
        assert!(!client.path("s3://bucket/b.txt").unwrap().local_cache_path().exists());
        assert!(client.cache_root().is_dir());

        // Clearing an already-empty cache is fine.
        client.clear_cache();
        client.path("s3://bucket/b.txt").unwrap().read_bytes().await.unwrap();
        assert_eq!(backend.download_count(), 4);
    }
}
