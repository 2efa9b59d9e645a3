//! Local-directory object store.
//!
//! Each drive is a directory under a root; each key is a relative path inside
//! it. Useful for running cloud-path code against plain disk, and in tests
//! that want real directories instead of synthesized ones.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::traits::{ListStream, StorageBackend};
use crate::types::{ListEntry, ObjectLocation, ObjectMetadata, PathKind};

/// Object store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a store rooted at `root`. Drives are its subdirectories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding every drive.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a location.
    pub fn local_path(&self, location: &ObjectLocation) -> PathBuf {
        let mut path: PathBuf = self.root.join(&location.drive);
        for part in location.key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}

/// Key of `path` relative to its drive directory.
fn key_for(drive_dir: &Path, path: &Path) -> Option<String> {
    let relative: &Path = path.strip_prefix(drive_dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn classify(&self, location: &ObjectLocation) -> Result<PathKind, StorageError> {
        let path: PathBuf = self.local_path(location);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(PathKind::File),
            Ok(meta) if meta.is_dir() => Ok(PathKind::Directory),
            Ok(_) => Ok(PathKind::Absent),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PathKind::Absent),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    async fn get_metadata(
        &self,
        location: &ObjectLocation,
    ) -> Result<ObjectMetadata, StorageError> {
        let path: PathBuf = self.local_path(location);
        let meta: std::fs::Metadata = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::not_found(location)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(location))
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let last_modified: SystemTime = meta.modified().map_err(|e| StorageError::io(&path, e))?;
        let nanos: u128 = last_modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        Ok(ObjectMetadata {
            size: meta.len(),
            last_modified,
            etag: Some(format!("{:x}-{:x}", meta.len(), nanos)),
            content_type: None,
        })
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), StorageError> {
        let path: PathBuf = self.local_path(location);
        if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(StorageError::not_found(location));
        }
        tokio::fs::copy(&path, dest)
            .await
            .map_err(|e| StorageError::io(dest, e))?;
        Ok(())
    }

    async fn upload(&self, src: &Path, location: &ObjectLocation) -> Result<(), StorageError> {
        let path: PathBuf = self.local_path(location);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::copy(src, &path)
            .await
            .map_err(|e| StorageError::io(src, e))?;
        Ok(())
    }

    fn list_children(&self, location: &ObjectLocation, recursive: bool) -> ListStream {
        let drive_dir: PathBuf = self.root.join(&location.drive);
        let dir: PathBuf = self.local_path(location);
        if !dir.is_dir() {
            return stream::empty().boxed();
        }

        let drive: String = location.drive.clone();
        let max_depth: usize = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&dir).min_depth(1).max_depth(max_depth).into_iter();

        stream::iter(walker)
            .filter_map(move |entry| {
                let item: Option<Result<ListEntry, StorageError>> = match entry {
                    Ok(entry) => key_for(&drive_dir, entry.path()).map(|key: String| {
                        Ok(ListEntry {
                            location: ObjectLocation::new(drive.clone(), key),
                            is_dir: entry.file_type().is_dir(),
                        })
                    }),
                    Err(e) => Some(Err(StorageError::IoError {
                        path: dir.display().to_string(),
                        message: e.to_string(),
                    })),
                };
                futures::future::ready(item)
            })
            .boxed()
    }

    async fn get_range(
        &self,
        location: &ObjectLocation,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StorageError> {
        let path: PathBuf = self.local_path(location);
        let mut file: tokio::fs::File = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(location))
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        if end < start {
            return Ok(Vec::new());
        }
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        let mut data: Vec<u8> = Vec::new();
        file.take(end - start + 1)
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(data)
    }

    async fn move_object(
        &self,
        src: &ObjectLocation,
        dst: &ObjectLocation,
        remove_src: bool,
    ) -> Result<(), StorageError> {
        let src_path: PathBuf = self.local_path(src);
        if !src_path.is_file() {
            return Err(StorageError::not_found(src));
        }

        if src == dst {
            let file: std::fs::File = std::fs::OpenOptions::new()
                .write(true)
                .open(&src_path)
                .map_err(|e| StorageError::io(&src_path, e))?;
            return file
                .set_modified(SystemTime::now())
                .map_err(|e| StorageError::io(&src_path, e));
        }

        let dst_path: PathBuf = self.local_path(dst);
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        if remove_src {
            tokio::fs::rename(&src_path, &dst_path)
                .await
                .map_err(|e| StorageError::io(&src_path, e))?;
        } else {
            tokio::fs::copy(&src_path, &dst_path)
                .await
                .map_err(|e| StorageError::io(&dst_path, e))?;
        }
        Ok(())
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        let path: PathBuf = self.local_path(location);
        let result: std::io::Result<()> = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };

        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StorageError::io(&path, e)),
            _ => Ok(()),
        }
    }

    async fn make_dir(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        let path: PathBuf = self.local_path(location);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }
}
