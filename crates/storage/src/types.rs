//! Shared data structures for backend connector operations.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusty_cloudpath_common::POSIX_SEPARATOR;
use serde::{Deserialize, Serialize};

/// Address of one object or prefix inside a remote store.
///
/// `drive` is the bucket/container; `key` is the object key without a leading
/// or trailing separator. An empty key addresses the drive root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocation {
    /// Bucket or container name.
    pub drive: String,
    /// Object key, `""` for the drive root.
    pub key: String,
}

impl ObjectLocation {
    /// Create a location, trimming stray separators from the key.
    pub fn new(drive: impl Into<String>, key: impl AsRef<str>) -> Self {
        Self {
            drive: drive.into(),
            key: key.as_ref().trim_matches(POSIX_SEPARATOR).to_string(),
        }
    }

    /// Whether this location is the drive root.
    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Location of a direct or nested child (`name` may contain separators).
    pub fn child(&self, name: &str) -> Self {
        if self.key.is_empty() {
            Self::new(self.drive.clone(), name)
        } else {
            Self::new(self.drive.clone(), format!("{}/{}", self.key, name))
        }
    }

    /// Key used as a listing prefix: `""` for the root, otherwise `key/`.
    pub fn prefix(&self) -> String {
        if self.key.is_empty() {
            String::new()
        } else {
            format!("{}/", self.key)
        }
    }

    /// Final key component, `""` for the root.
    pub fn name(&self) -> &str {
        self.key.rsplit(POSIX_SEPARATOR).next().unwrap_or("")
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}/", self.drive)
        } else {
            write!(f, "{}/{}", self.drive, self.key)
        }
    }
}

/// What a location refers to in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// A single object.
    File,
    /// A prefix with at least one object beneath it, or an explicit marker.
    Directory,
    /// Nothing at this location.
    Absent,
}

/// Metadata of one remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Last modified time as reported by the store.
    pub last_modified: SystemTime,
    /// ETag or an equivalent content version token.
    pub etag: Option<String>,
    /// Content type, when the store records one.
    pub content_type: Option<String>,
}

/// One entry produced by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListEntry {
    /// Full location of the child.
    pub location: ObjectLocation,
    /// Whether the child is a (possibly implied) directory.
    pub is_dir: bool,
}

/// Drop sub-millisecond precision from a timestamp.
///
/// Remote stores report last-modified times at millisecond (or coarser)
/// resolution while local filesystems keep nanoseconds, so every mtime
/// comparison goes through this.
pub fn truncate_to_millis(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_millis(since.as_millis() as u64),
        Err(_) => time,
    }
}

/// Seconds since the epoch as a float, for error messages.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}
