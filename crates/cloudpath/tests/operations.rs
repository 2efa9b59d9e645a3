//! Integration tests for metadata, transfer and mutation operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use rusty_cloudpath::{
    AnyPath, Client, CloudPath, CloudPathError, ListStream, MemoryBackend, ObjectLocation,
    ObjectMetadata, PathKind, Provider, StorageBackend, StorageError,
};
use tempfile::TempDir;

fn create_test_env() -> (Client, Arc<MemoryBackend>) {
    let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    let client: Client = Client::new(Provider::S3, backend.clone()).unwrap();
    (client, backend)
}

// =============================================================================
// METADATA TESTS
// =============================================================================

mod metadata {
    use super::*;

    #[tokio::test]
    async fn test_exists_is_file_is_dir() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "d/f.txt", b"x".to_vec());

        let file: CloudPath = client.path("s3://bucket/d/f.txt").unwrap();
        let dir: CloudPath = client.path("s3://bucket/d").unwrap();
        let absent: CloudPath = client.path("s3://bucket/nope").unwrap();

        assert!(file.exists().await.unwrap());
        assert!(file.is_file().await.unwrap());
        assert!(!file.is_dir().await.unwrap());
        assert!(dir.is_dir().await.unwrap());
        assert!(!absent.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_stat() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "d/f.txt", b"12345".to_vec());

        let stat: ObjectMetadata = client.path("s3://bucket/d/f.txt").unwrap().stat().await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.etag.is_some());

        for uri in ["s3://bucket/d", "s3://bucket/missing"] {
            assert!(matches!(
                client.path(uri).unwrap().stat().await,
                Err(CloudPathError::NoStat { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_fspath_materializes_files_only() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "f.txt", b"body".to_vec());

        let local: PathBuf = client.path("s3://bucket/f.txt").unwrap().fspath().await.unwrap();
        assert_eq!(std::fs::read(local).unwrap(), b"body");

        let missing: CloudPath = client.path("s3://bucket/new.txt").unwrap();
        assert_eq!(missing.fspath().await.unwrap(), missing.local_cache_path());
        assert!(!missing.local_cache_path().exists());
    }
}

// =============================================================================
// TRANSFER TESTS
// =============================================================================

mod transfer {
    use super::*;

    #[tokio::test]
    async fn test_download_file_and_tree() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "t/a.txt", b"a".to_vec());
        backend.put_object("bucket", "t/sub/b.txt", b"b".to_vec());
        let dest: TempDir = TempDir::new().unwrap();

        let file: PathBuf = client
            .path("s3://bucket/t/a.txt")
            .unwrap()
            .download_to(dest.path())
            .await
            .unwrap();
        assert_eq!(file, dest.path().join("a.txt"));

        let tree: PathBuf = dest.path().join("tree");
        client.path("s3://bucket/t").unwrap().download_to(&tree).await.unwrap();
        assert_eq!(std::fs::read(tree.join("a.txt")).unwrap(), b"a");
        assert_eq!(std::fs::read(tree.join("sub").join("b.txt")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_upload_file_and_tree() {
        let (client, backend) = create_test_env();
        let src: TempDir = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("nested")).unwrap();
        std::fs::write(src.path().join("one.txt"), b"1").unwrap();
        std::fs::write(src.path().join("nested").join("two.txt"), b"2").unwrap();

        let uploaded: CloudPath = client
            .path("s3://bucket/up/one.txt")
            .unwrap()
            .upload_from(src.path().join("one.txt"), false)
            .await
            .unwrap();
        assert_eq!(uploaded.as_uri(), "s3://bucket/up/one.txt");

        client
            .path("s3://bucket/tree")
            .unwrap()
            .upload_from(src.path(), false)
            .await
            .unwrap();
        assert_eq!(backend.object_data("bucket", "tree/one.txt").unwrap(), b"1");
        assert_eq!(backend.object_data("bucket", "tree/nested/two.txt").unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_upload_into_existing_directory_keeps_name() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "dir/other.txt", b"o".to_vec());
        let src: TempDir = TempDir::new().unwrap();
        std::fs::write(src.path().join("mine.txt"), b"m").unwrap();

        let dst: CloudPath = client
            .path("s3://bucket/dir")
            .unwrap()
            .upload_from(src.path().join("mine.txt"), false)
            .await
            .unwrap();
        assert_eq!(dst.as_uri(), "s3://bucket/dir/mine.txt");
    }

    #[tokio::test]
    async fn test_upload_refuses_newer_cloud() {
        let (client, backend) = create_test_env();
        let later: SystemTime = SystemTime::now() + Duration::from_secs(3600);
        backend.put_object_at("bucket", "f.txt", b"cloud".to_vec(), later);
        let src: TempDir = TempDir::new().unwrap();
        let file: PathBuf = src.path().join("f.txt");
        std::fs::write(&file, b"local").unwrap();

        let path: CloudPath = client.path("s3://bucket/f.txt").unwrap();
        assert!(matches!(
            path.upload_from(&file, false).await,
            Err(CloudPathError::OverwriteNewerCloud { .. })
        ));
        path.upload_from(&file, true).await.unwrap();
        assert_eq!(backend.object_data("bucket", "f.txt").unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_copy_same_client_is_server_side() {
        let (client, backend) = create_test_env();
        let past: SystemTime = SystemTime::now() - Duration::from_secs(60);
        backend.put_object_at("bucket", "src.txt", b"data".to_vec(), past);

        let src: CloudPath = client.path("s3://bucket/src.txt").unwrap();
        let dst: AnyPath = src
            .copy(&AnyPath::Cloud(client.path("s3://bucket/copy.txt").unwrap()), false)
            .await
            .unwrap();

        assert_eq!(dst.to_string(), "s3://bucket/copy.txt");
        assert_eq!(backend.object_data("bucket", "copy.txt").unwrap(), b"data");
        assert_eq!(backend.download_count(), 0);
        assert!(src.exists().await.unwrap());

        // The copy is newer than its source now.
        assert!(matches!(
            src.copy(&dst, false).await,
            Err(CloudPathError::OverwriteNewerCloud { .. })
        ));
    }

    /// Store whose metadata lookups fail for one key.
    struct FailingMetadata {
        inner: Arc<MemoryBackend>,
        failing_key: &'static str,
    }

    #[async_trait]
    impl StorageBackend for FailingMetadata {
        async fn classify(&self, location: &ObjectLocation) -> Result<PathKind, StorageError> {
            self.inner.classify(location).await
        }

        async fn get_metadata(
            &self,
            location: &ObjectLocation,
        ) -> Result<ObjectMetadata, StorageError> {
            if location.key == self.failing_key {
                return Err(StorageError::NetworkError {
                    message: "connection reset".into(),
                    retryable: true,
                });
            }
            self.inner.get_metadata(location).await
        }

        async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), StorageError> {
            self.inner.download(location, dest).await
        }

        async fn upload(&self, src: &Path, location: &ObjectLocation) -> Result<(), StorageError> {
            self.inner.upload(src, location).await
        }

        fn list_children(&self, location: &ObjectLocation, recursive: bool) -> ListStream {
            self.inner.list_children(location, recursive)
        }

        async fn move_object(
            &self,
            src: &ObjectLocation,
            dst: &ObjectLocation,
            remove_src: bool,
        ) -> Result<(), StorageError> {
            self.inner.move_object(src, dst, remove_src).await
        }

        async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
            self.inner.delete(location).await
        }
    }

    #[tokio::test]
    async fn test_copy_fails_when_destination_metadata_fails() {
        let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
        let now: SystemTime = SystemTime::now();
        backend.put_object_at("bucket", "src.txt", b"old".to_vec(), now - Duration::from_secs(3600));
        backend.put_object_at("bucket", "dst.txt", b"new".to_vec(), now);
        let flaky: Arc<FailingMetadata> = Arc::new(FailingMetadata {
            inner: backend.clone(),
            failing_key: "dst.txt",
        });
        let client: Client = Client::new(Provider::S3, flaky).unwrap();

        let src: CloudPath = client.path("s3://bucket/src.txt").unwrap();
        let dst: CloudPath = client.path("s3://bucket/dst.txt").unwrap();
        let err: CloudPathError = src.copy(&dst.into(), false).await.unwrap_err();

        assert!(matches!(err, CloudPathError::Storage(StorageError::NetworkError { .. })));
        assert_eq!(backend.object_data("bucket", "dst.txt").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_copy_across_clients_and_to_local() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "src.txt", b"data".to_vec());
        let other_backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
        let other: Client = Client::new(Provider::S3, other_backend.clone()).unwrap();

        let src: CloudPath = client.path("s3://bucket/src.txt").unwrap();
        src.copy(&other.path("s3://elsewhere/dst.txt").unwrap().into(), false)
            .await
            .unwrap();
        assert_eq!(other_backend.object_data("elsewhere", "dst.txt").unwrap(), b"data");

        let local: TempDir = TempDir::new().unwrap();
        let copied: AnyPath = src.copy(&local.path().into(), false).await.unwrap();
        assert_eq!(copied.as_local().unwrap(), local.path().join("src.txt"));
    }

    #[tokio::test]
    async fn test_copytree() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "t/a.txt", b"a".to_vec());
        backend.put_object("bucket", "t/sub/b.txt", b"b".to_vec());

        client
            .path("s3://bucket/t")
            .unwrap()
            .copytree(&client.path("s3://bucket/t2").unwrap().into(), false)
            .await
            .unwrap();
        assert_eq!(backend.object_data("bucket", "t2/a.txt").unwrap(), b"a");
        assert_eq!(backend.object_data("bucket", "t2/sub/b.txt").unwrap(), b"b");
    }
}

// =============================================================================
// MUTATION TESTS
// =============================================================================

mod mutation {
    use super::*;

    #[tokio::test]
    async fn test_rename_file_and_directory() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "old.txt", b"x".to_vec());
        backend.put_object("bucket", "dir/a.txt", b"a".to_vec());
        backend.put_object("bucket", "dir/sub/b.txt", b"b".to_vec());

        let moved: CloudPath = client
            .path("s3://bucket/old.txt")
            .unwrap()
            .rename(&client.path("s3://bucket/new.txt").unwrap())
            .await
            .unwrap();
        assert!(moved.exists().await.unwrap());
        assert!(backend.object_data("bucket", "old.txt").is_none());

        client
            .path("s3://bucket/dir")
            .unwrap()
            .replace(&client.path("s3://bucket/moved").unwrap())
            .await
            .unwrap();
        assert_eq!(backend.object_data("bucket", "moved/sub/b.txt").unwrap(), b"b");
        assert!(!client.path("s3://bucket/dir").unwrap().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_unlink() {
        let (client, backend) = create_test_env();
        backend.put_object("bucket", "d/f.txt", b"x".to_vec());

        assert!(matches!(
            client.path("s3://bucket/d").unwrap().unlink(false).await,
            Err(CloudPathError::IsADirectory { .. })
        ));
        assert!(matches!(
            client.path("s3://bucket/none").unwrap().unlink(false).await,
            Err(CloudPathError::FileNotFound { .. })
        ));
        client.path("s3://bucket/none").unwrap().unlink(true).await.unwrap();
        client.path("s3://bucket/d/f.txt").unwrap().unlink(false).await.unwrap();
        assert!(backend.object_data("bucket", "d/f.txt").is_none());
    }

    #[tokio::test]
    async fn test_mkdir_rmdir_rmtree() {
        let (client, backend) = create_test_env();
        let dir: CloudPath = client.path("s3://bucket/made").unwrap();

        dir.mkdir(false, false).await.unwrap();
        assert!(dir.is_dir().await.unwrap());
        assert!(matches!(
            dir.mkdir(false, false).await,
            Err(CloudPathError::FileExists { .. })
        ));
        dir.mkdir(false, true).await.unwrap();
        assert!(matches!(
            client.path("s3://bucket/x/y").unwrap().mkdir(false, false).await,
            Err(CloudPathError::FileNotFound { .. })
        ));
        client.path("s3://bucket/x/y").unwrap().mkdir(true, false).await.unwrap();

        dir.rmdir().await.unwrap();
        assert!(!dir.exists().await.unwrap());

        backend.put_object("bucket", "full/a.txt", b"a".to_vec());
        backend.put_object("bucket", "full/sub/b.txt", b"b".to_vec());
        let full: CloudPath = client.path("s3://bucket/full").unwrap();
        assert!(matches!(
            full.rmdir().await,
            Err(CloudPathError::DirectoryNotEmpty { .. })
        ));
        assert!(matches!(
            client.path("s3://bucket/full/a.txt").unwrap().rmdir().await,
            Err(CloudPathError::NotADirectory { .. })
        ));

        full.rmtree().await.unwrap();
        assert!(!full.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_touch() {
        let (client, backend) = create_test_env();
        let path: CloudPath = client.path("s3://bucket/touched.txt").unwrap();

        path.touch(false).await.unwrap();
        assert_eq!(backend.object_data("bucket", "touched.txt").unwrap(), b"");
        assert!(matches!(
            path.touch(false).await,
            Err(CloudPathError::FileExists { .. })
        ));
        path.touch(true).await.unwrap();
    }
}

// =============================================================================
// STREAMING READ TESTS
// =============================================================================

mod streaming {
    use super::*;
    use futures::TryStreamExt;
    use rusty_cloudpath::CloudStreamReader;

    fn create_streaming_env() -> (Client, Arc<MemoryBackend>) {
        let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
        let client: Client = Client::builder(Provider::S3, backend.clone())
            .raw_io(CloudStreamReader::factory(4))
            .build()
            .unwrap();
        (client, backend)
    }

    #[tokio::test]
    async fn test_open_stream_skips_mirror() {
        let (client, backend) = create_streaming_env();
        backend.put_object("bucket", "big.bin", b"0123456789".to_vec());
        let path: CloudPath = client.path("s3://bucket/big.bin").unwrap();

        let mut reader: CloudStreamReader = path.open_stream().await.unwrap();
        assert_eq!(reader.size(), 10);
        assert_eq!(reader.read_to_end().await.unwrap(), b"0123456789");

        assert_eq!(backend.download_count(), 0);
        assert!(backend.range_read_count() >= 3);
        assert!(!path.local_cache_path().exists());
    }

    #[tokio::test]
    async fn test_open_stream_chunks() {
        let (client, backend) = create_streaming_env();
        backend.put_object("bucket", "big.bin", b"abcdefghij".to_vec());
        let path: CloudPath = client.path("s3://bucket/big.bin").unwrap();

        let chunks: Vec<Vec<u8>> = path
            .open_stream()
            .await
            .unwrap()
            .into_chunks()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"abcdefghij");
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_open_stream_errors() {
        let (client, backend) = create_streaming_env();
        backend.put_object("bucket", "dir/f.txt", b"x".to_vec());

        assert!(matches!(
            client.path("s3://bucket/dir").unwrap().open_stream().await,
            Err(CloudPathError::NotAFile { .. })
        ));
        assert!(matches!(
            client.path("s3://bucket/missing").unwrap().open_stream().await,
            Err(CloudPathError::FileNotFound { .. })
        ));

        let (plain, plain_backend) = create_test_env();
        plain_backend.put_object("bucket", "f.txt", b"x".to_vec());
        assert!(!plain.supports_raw_io());
        assert!(matches!(
            plain.path("s3://bucket/f.txt").unwrap().open_stream().await,
            Err(CloudPathError::NotImplemented { .. })
        ));
    }
}
