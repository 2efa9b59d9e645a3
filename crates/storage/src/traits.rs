//! Backend connector interface.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StorageError;
use crate::types::{ListEntry, ObjectLocation, ObjectMetadata, PathKind};

/// Lazy sequence of listing entries. Connectors fetch further pages only as
/// the stream is polled.
pub type ListStream = BoxStream<'static, Result<ListEntry, StorageError>>;

/// Raw operations against one remote store - implemented by each backend.
///
/// Connectors never retry on their own behalf unless the underlying SDK does;
/// failures propagate to the caller unchanged. A missing object is always
/// reported as `StorageError::NotFound` so callers can tell it apart from
/// other failures.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Classify a location as a file, a directory (prefix), or absent.
    async fn classify(&self, location: &ObjectLocation) -> Result<PathKind, StorageError>;

    /// Check whether anything exists at a location.
    async fn exists(&self, location: &ObjectLocation) -> Result<bool, StorageError> {
        Ok(self.classify(location).await? != PathKind::Absent)
    }

    /// Fetch metadata for a single object.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` when no object exists at the location
    /// (directory-shaped locations have no object and are also "not found").
    async fn get_metadata(&self, location: &ObjectLocation)
        -> Result<ObjectMetadata, StorageError>;

    /// Download one object into `dest`, replacing its content.
    ///
    /// The parent directory of `dest` must exist.
    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), StorageError>;

    /// Upload a local file as one object, replacing any existing object.
    async fn upload(&self, src: &Path, location: &ObjectLocation) -> Result<(), StorageError>;

    /// List the children of a directory-shaped location.
    ///
    /// # Arguments
    /// * `location` - Prefix to list (the drive root when the key is empty)
    /// * `recursive` - Return every descendant instead of immediate children
    ///
    /// # Returns
    /// A stream of entries in no guaranteed order; each implied directory
    /// appears once. Nothing is requested from the store until it is polled,
    /// and a listing failure surfaces as an `Err` item.
    fn list_children(&self, location: &ObjectLocation, recursive: bool) -> ListStream;

    /// Fetch the bytes `start..=end` of one object.
    ///
    /// Ranges past the end of the object are clamped; a range starting past
    /// the end yields no bytes. The default downloads the whole object into a
    /// temp file and slices it, so connectors with ranged reads override it.
    async fn get_range(
        &self,
        location: &ObjectLocation,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StorageError> {
        let temp: tempfile::NamedTempFile = tempfile::NamedTempFile::new()?;
        self.download(location, temp.path()).await?;
        let data: Vec<u8> = tokio::fs::read(temp.path())
            .await
            .map_err(|e| StorageError::io(temp.path(), e))?;
        Ok(slice_range(&data, start, end).to_vec())
    }

    /// Server-side copy of one object, deleting the source when `remove_src` is set.
    async fn move_object(
        &self,
        src: &ObjectLocation,
        dst: &ObjectLocation,
        remove_src: bool,
    ) -> Result<(), StorageError>;

    /// Delete an object, or everything under a directory-shaped location.
    ///
    /// Deleting an absent location succeeds.
    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError>;

    /// Create a directory. Object stores have no real directories, so the
    /// default does nothing.
    async fn make_dir(&self, _location: &ObjectLocation) -> Result<(), StorageError> {
        Ok(())
    }

    /// Update an object's last-modified time, creating an empty object if
    /// nothing is there.
    ///
    /// The default copies an existing object onto itself and otherwise uploads
    /// an empty file.
    async fn touch(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        if self.classify(location).await? == PathKind::File {
            return self.move_object(location, location, false).await;
        }

        let empty: tempfile::NamedTempFile = tempfile::NamedTempFile::new()?;
        self.upload(empty.path(), location).await
    }
}

/// Clamp an inclusive byte range to `data`.
pub fn slice_range(data: &[u8], start: u64, end: u64) -> &[u8] {
    let len: u64 = data.len() as u64;
    if start >= len || end < start {
        return &[];
    }
    let stop: u64 = end.saturating_add(1).min(len);
    &data[start as usize..stop as usize]
}
