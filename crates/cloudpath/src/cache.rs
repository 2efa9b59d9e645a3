//! Cache coherency between local mirrors and remote objects.
//!
//! A mirror's mtime is the coherency oracle. After every download or upload it
//! is set to the remote object's last-modified time, so later comparisons tell
//! whether the remote moved on (re-download), the mirror was changed behind
//! our back (conflict), or nothing happened (cache hit). Comparisons run at
//! millisecond resolution.
//!
//! Refreshes of one mirror are serialized with a per-mirror async lock; the
//! dirty set in the client makes pending writes visible to every handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use rusty_cloudpath_common::WRITE_MTIME_BUMP;
use rusty_cloudpath_storage::{
    epoch_seconds, truncate_to_millis, ObjectLocation, ObjectMetadata, PathKind,
};
use tempfile::NamedTempFile;
use tokio::sync::OwnedMutexGuard;

use crate::client::Client;
use crate::error::CloudPathError;
use crate::options::CacheMode;

/// Outcome of a refresh-for-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The mirror was (re)written from the remote object.
    Downloaded,
    /// The mirror already matched the remote object.
    Hit,
    /// There is no remote object. Stale clean mirrors are removed.
    RemoteAbsent,
}

/// Modification time of a local file, `None` when it does not exist.
pub(crate) fn local_mtime(path: &Path) -> Result<Option<SystemTime>, CloudPathError> {
    match std::fs::metadata(path) {
        Ok(meta) => meta
            .modified()
            .map(Some)
            .map_err(|e| CloudPathError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CloudPathError::io(path, e)),
    }
}

/// Set the modification time of a local file.
pub(crate) fn set_mtime(path: &Path, time: SystemTime) -> Result<(), CloudPathError> {
    let file: std::fs::File = std::fs::File::options()
        .write(true)
        .open(path)
        .map_err(|e| CloudPathError::io(path, e))?;
    file.set_modified(time).map_err(|e| CloudPathError::io(path, e))
}

/// Exclusive access to one mirror.
///
/// The lock's map entry is removed when the last holder lets go, so the map
/// only tracks mirrors with a refresh or push in flight.
struct MirrorGuard<'a> {
    client: &'a Client,
    mirror: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MirrorGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.client.inner.mirror_locks.lock().unwrap();
        drop(self.guard.take());
        // Waiters clone the Arc under the map lock, so a count of one means
        // the map is the last holder.
        if locks
            .get(&self.mirror)
            .map_or(false, |lock: &Arc<tokio::sync::Mutex<()>>| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.mirror);
        }
    }
}

impl Client {
    fn cloud_uri(&self, location: &ObjectLocation) -> String {
        format!("{}://{}", self.scheme(), location)
    }

    async fn lock_mirror(&self, mirror: &Path) -> MirrorGuard<'_> {
        let lock: Arc<tokio::sync::Mutex<()>> = {
            let mut locks = self.inner.mirror_locks.lock().unwrap();
            Arc::clone(locks.entry(mirror.to_path_buf()).or_default())
        };
        MirrorGuard {
            client: self,
            mirror: mirror.to_path_buf(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub(crate) fn mark_dirty(&self, mirror: &Path) {
        self.inner.dirty.lock().unwrap().insert(mirror.to_path_buf());
    }

    fn clear_dirty(&self, mirror: &Path) {
        self.inner.dirty.lock().unwrap().remove(mirror);
    }

    /// Make the mirror of a remote file current before reading it.
    ///
    /// # Arguments
    /// * `location` - Remote object
    /// * `force` - Always re-download, even over dirty or newer local content
    ///
    /// # Errors
    /// * `OverwriteDirtyFile` - the mirror has unpushed writes
    /// * `OverwriteNewerLocal` - the mirror was modified outside this library
    /// * `NotAFile` - the location (or its mirror) is a directory
    /// * connector failures, unchanged
    pub async fn refresh_for_read(
        &self,
        location: &ObjectLocation,
        force: bool,
    ) -> Result<Refresh, CloudPathError> {
        let mirror: PathBuf = self.mirror_path(location);
        let _guard: MirrorGuard<'_> = self.lock_mirror(&mirror).await;

        let remote: ObjectMetadata = match self.backend().get_metadata(location).await {
            Ok(meta) => meta,
            Err(err) if err.is_not_found() => {
                if self.backend().classify(location).await? == PathKind::Directory {
                    return Err(CloudPathError::NotAFile {
                        path: self.cloud_uri(location),
                    });
                }
                if mirror.is_file() && !self.is_dirty(&mirror) {
                    self.inner.remove_mirror(&mirror);
                }
                return Ok(Refresh::RemoteAbsent);
            }
            Err(err) => return Err(err.into()),
        };

        if mirror.is_dir() {
            return Err(CloudPathError::NotAFile {
                path: mirror.display().to_string(),
            });
        }

        let local: SystemTime = match local_mtime(&mirror)? {
            Some(local) if !force => local,
            _ => {
                self.download_mirror(location, &mirror, &remote).await?;
                return Ok(Refresh::Downloaded);
            }
        };

        let local_ms: SystemTime = truncate_to_millis(local);
        let remote_ms: SystemTime = truncate_to_millis(remote.last_modified);

        if self.is_dirty(&mirror) {
            return Err(CloudPathError::OverwriteDirtyFile {
                cloud_path: self.cloud_uri(location),
                local_path: mirror.display().to_string(),
                local_mtime: epoch_seconds(local),
                remote_mtime: epoch_seconds(remote.last_modified),
            });
        }

        if local_ms < remote_ms {
            self.download_mirror(location, &mirror, &remote).await?;
            Ok(Refresh::Downloaded)
        } else if local_ms > remote_ms {
            Err(CloudPathError::OverwriteNewerLocal {
                cloud_path: self.cloud_uri(location),
                local_path: mirror.display().to_string(),
                local_mtime: epoch_seconds(local),
                remote_mtime: epoch_seconds(remote.last_modified),
            })
        } else {
            log::debug!("Cache hit for {}", self.cloud_uri(location));
            Ok(Refresh::Hit)
        }
    }

    /// Download into a sibling temp file and rename it over the mirror, so a
    /// failed transfer never leaves a truncated mirror behind.
    async fn download_mirror(
        &self,
        location: &ObjectLocation,
        mirror: &Path,
        remote: &ObjectMetadata,
    ) -> Result<(), CloudPathError> {
        let parent: &Path = mirror.parent().ok_or_else(|| CloudPathError::InvalidPath {
            message: format!("mirror {} has no parent directory", mirror.display()),
        })?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CloudPathError::io(parent, e))?;

        let temp: NamedTempFile =
            NamedTempFile::new_in(parent).map_err(|e| CloudPathError::io(parent, e))?;
        self.backend().download(location, temp.path()).await?;
        temp.persist(mirror)
            .map_err(|e| CloudPathError::io(mirror, e.error))?;
        set_mtime(mirror, remote.last_modified)?;

        log::debug!(
            "Downloaded {} to {}",
            self.cloud_uri(location),
            mirror.display()
        );
        Ok(())
    }

    /// Upload the mirror of a remote file.
    ///
    /// Uploads when the remote does not exist or is older than the mirror.
    /// On success the mirror's mtime is set to the new remote last-modified
    /// time and its dirty flag is cleared; on failure both are left alone.
    ///
    /// # Errors
    /// * `OverwriteNewerCloud` - the remote is at least as new as the mirror
    ///   and `force` is not set
    /// * `FileNotFound` / `NotAFile` - there is no mirror file to push
    pub async fn push_to_remote(
        &self,
        location: &ObjectLocation,
        force: bool,
    ) -> Result<(), CloudPathError> {
        let mirror: PathBuf = self.mirror_path(location);
        let _guard: MirrorGuard<'_> = self.lock_mirror(&mirror).await;

        if mirror.is_dir() {
            return Err(CloudPathError::NotAFile {
                path: mirror.display().to_string(),
            });
        }
        let local: SystemTime = local_mtime(&mirror)?.ok_or_else(|| CloudPathError::FileNotFound {
            path: mirror.display().to_string(),
        })?;

        match self.backend().get_metadata(location).await {
            Ok(remote) => {
                let remote_newer: bool =
                    truncate_to_millis(local) <= truncate_to_millis(remote.last_modified);
                if remote_newer && !force {
                    return Err(CloudPathError::OverwriteNewerCloud {
                        cloud_path: self.cloud_uri(location),
                        local_path: mirror.display().to_string(),
                        local_mtime: epoch_seconds(local),
                        remote_mtime: epoch_seconds(remote.last_modified),
                    });
                }
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        self.backend().upload(&mirror, location).await?;
        let uploaded: ObjectMetadata = self.backend().get_metadata(location).await?;
        set_mtime(&mirror, uploaded.last_modified)?;
        self.clear_dirty(&mirror);

        log::debug!("Uploaded {} to {}", mirror.display(), self.cloud_uri(location));
        Ok(())
    }

    /// Close-time hook of a writer: make sure the write looks newer than what
    /// was there before, push, and evict in `close_on_file` mode.
    pub(crate) async fn finish_write(
        &self,
        location: &ObjectLocation,
        original_mtime: Option<SystemTime>,
        force: bool,
    ) -> Result<(), CloudPathError> {
        let mirror: PathBuf = self.mirror_path(location);

        if let (Some(original), Some(current)) = (original_mtime, local_mtime(&mirror)?) {
            if truncate_to_millis(current) <= truncate_to_millis(original) {
                set_mtime(&mirror, original + WRITE_MTIME_BUMP)?;
            }
        }

        self.push_to_remote(location, force).await?;

        if self.cache_mode() == CacheMode::CloseOnFile {
            self.inner.remove_mirror(&mirror);
        }
        Ok(())
    }
}
