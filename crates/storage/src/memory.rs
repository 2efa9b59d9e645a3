//! In-memory object store.
//!
//! Stands in for a real provider in tests and fixtures. Objects live in a
//! sorted map; every download, upload and listing call is counted so callers
//! can assert on network traffic.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::StorageError;
use crate::listing::{classify_from_keys, list_from_keys};
use crate::traits::{slice_range, ListStream, StorageBackend};
use crate::types::{truncate_to_millis, ListEntry, ObjectLocation, ObjectMetadata, PathKind};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    last_modified: SystemTime,
    etag: String,
}

/// Object store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Objects keyed by (drive, key).
    objects: Mutex<BTreeMap<(String, String), MemoryObject>>,
    generation: AtomicU64,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    listings: AtomicUsize,
    range_reads: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, stamped with the current time.
    ///
    /// Does not count as an upload.
    pub fn put_object(&self, drive: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.put_object_at(drive, key, data, SystemTime::now());
    }

    /// Store an object directly with an explicit last-modified time.
    pub fn put_object_at(
        &self,
        drive: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        last_modified: SystemTime,
    ) {
        let object: MemoryObject = MemoryObject {
            data: data.into(),
            last_modified: truncate_to_millis(last_modified),
            etag: self.next_etag(),
        };
        self.objects
            .lock()
            .unwrap()
            .insert((drive.to_string(), key.to_string()), object);
    }

    /// Read an object's bytes directly, without counting a download.
    pub fn object_data(&self, drive: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(drive.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Change an object's last-modified time.
    ///
    /// # Returns
    /// `false` when no such object exists.
    pub fn set_last_modified(&self, drive: &str, key: &str, last_modified: SystemTime) -> bool {
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(&(drive.to_string(), key.to_string())) {
            Some(object) => {
                object.last_modified = truncate_to_millis(last_modified);
                true
            }
            None => false,
        }
    }

    /// Number of `download` calls served.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Number of `upload` calls served.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of `get_range` calls served.
    pub fn range_read_count(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Number of `list_children` calls served.
    pub fn list_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn next_etag(&self) -> String {
        format!("\"{:016x}\"", self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn drive_keys(&self, drive: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, _)| d == drive)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn get(&self, location: &ObjectLocation) -> Option<MemoryObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(location.drive.clone(), location.key.clone()))
            .cloned()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn classify(&self, location: &ObjectLocation) -> Result<PathKind, StorageError> {
        let keys: Vec<String> = self.drive_keys(&location.drive);
        Ok(classify_from_keys(location, keys.iter().map(String::as_str)))
    }

    async fn get_metadata(
        &self,
        location: &ObjectLocation,
    ) -> Result<ObjectMetadata, StorageError> {
        let object: MemoryObject = self
            .get(location)
            .ok_or_else(|| StorageError::not_found(location))?;

        Ok(ObjectMetadata {
            size: object.data.len() as u64,
            last_modified: object.last_modified,
            etag: Some(object.etag),
            content_type: None,
        })
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), StorageError> {
        let object: MemoryObject = self
            .get(location)
            .ok_or_else(|| StorageError::not_found(location))?;

        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, &object.data)
            .await
            .map_err(|e| StorageError::io(dest, e))
    }

    async fn upload(&self, src: &Path, location: &ObjectLocation) -> Result<(), StorageError> {
        let data: Vec<u8> = tokio::fs::read(src)
            .await
            .map_err(|e| StorageError::io(src, e))?;

        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.put_object(&location.drive, &location.key, data);
        Ok(())
    }

    fn list_children(&self, location: &ObjectLocation, recursive: bool) -> ListStream {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<String> = self.drive_keys(&location.drive);
        let entries: Vec<ListEntry> =
            list_from_keys(location, keys.iter().map(String::as_str), recursive);
        stream::iter(entries.into_iter().map(Ok::<ListEntry, StorageError>)).boxed()
    }

    async fn get_range(
        &self,
        location: &ObjectLocation,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StorageError> {
        let object: MemoryObject = self
            .get(location)
            .ok_or_else(|| StorageError::not_found(location))?;

        self.range_reads.fetch_add(1, Ordering::SeqCst);
        Ok(slice_range(&object.data, start, end).to_vec())
    }

    async fn move_object(
        &self,
        src: &ObjectLocation,
        dst: &ObjectLocation,
        remove_src: bool,
    ) -> Result<(), StorageError> {
        let object: MemoryObject = self
            .get(src)
            .ok_or_else(|| StorageError::not_found(src))?;

        self.put_object(&dst.drive, &dst.key, object.data);
        if remove_src && src != dst {
            self.objects
                .lock()
                .unwrap()
                .remove(&(src.drive.clone(), src.key.clone()));
        }
        Ok(())
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        let prefix: String = location.prefix();
        let mut objects = self.objects.lock().unwrap();

        if objects
            .remove(&(location.drive.clone(), location.key.clone()))
            .is_some()
        {
            return Ok(());
        }

        objects.retain(|(drive, key), _| !(drive == &location.drive && key.starts_with(&prefix)));
        Ok(())
    }

    async fn make_dir(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        if location.is_root() {
            return Ok(());
        }
        self.put_object(&location.drive, &location.prefix(), Vec::new());
        Ok(())
    }
}
