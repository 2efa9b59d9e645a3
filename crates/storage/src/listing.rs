//! Directory emulation over flat key sets.
//!
//! Object stores only know keys. A "directory" is any prefix ending at a `/`
//! that some key continues past, or an explicit zero-byte marker key ending in
//! `/`. These helpers turn a set of keys into the hierarchy connectors report.

use std::collections::HashSet;

use crate::types::{ListEntry, ObjectLocation, PathKind};

/// Incremental version of [`list_from_keys`] for connectors that receive keys
/// page by page.
///
/// Remembers which implied directories were already reported, so each one
/// appears exactly once across all pages.
#[derive(Debug, Clone)]
pub struct ListingBuilder {
    parent: ObjectLocation,
    prefix: String,
    recursive: bool,
    seen_dirs: HashSet<String>,
}

impl ListingBuilder {
    /// Start a listing of `parent`.
    pub fn new(parent: &ObjectLocation, recursive: bool) -> Self {
        Self {
            parent: parent.clone(),
            prefix: parent.prefix(),
            recursive,
            seen_dirs: HashSet::new(),
        }
    }

    /// Entries contributed by one key, in order: new implied directories
    /// first, then the key itself when it is a file at the listed depth.
    pub fn push(&mut self, key: &str) -> Vec<ListEntry> {
        let mut entries: Vec<ListEntry> = Vec::new();
        let rest: &str = match key.strip_prefix(self.prefix.as_str()) {
            Some(rest) if !rest.is_empty() => rest,
            _ => return entries,
        };

        let dir_ends: Vec<usize> = rest.match_indices('/').map(|(i, _)| i).collect();
        let dir_ends: &[usize] = if self.recursive {
            &dir_ends
        } else {
            &dir_ends[..dir_ends.len().min(1)]
        };

        for end in dir_ends {
            let dir_key: String = format!("{}{}", self.prefix, &rest[..*end]);
            if self.seen_dirs.insert(dir_key.clone()) {
                entries.push(ListEntry {
                    location: ObjectLocation::new(self.parent.drive.clone(), dir_key),
                    is_dir: true,
                });
            }
        }

        let is_nested: bool = rest.contains('/');
        if !is_nested || (self.recursive && !rest.ends_with('/')) {
            entries.push(ListEntry {
                location: ObjectLocation::new(self.parent.drive.clone(), key),
                is_dir: false,
            });
        }
        entries
    }
}

/// Build the listing of `parent` from the keys of its drive.
///
/// # Arguments
/// * `parent` - Location being listed
/// * `keys` - Every key in the drive (or at least every key under the prefix)
/// * `recursive` - Include all descendants instead of immediate children
///
/// # Returns
/// Files and implied directories under `parent`, each directory exactly once,
/// in the order first seen.
pub fn list_from_keys<'a, I>(parent: &ObjectLocation, keys: I, recursive: bool) -> Vec<ListEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder: ListingBuilder = ListingBuilder::new(parent, recursive);
    keys.into_iter().flat_map(|key: &str| builder.push(key)).collect()
}

/// Classify a location against the keys of its drive.
///
/// The drive root is always a directory.
pub fn classify_from_keys<'a, I>(location: &ObjectLocation, keys: I) -> PathKind
where
    I: IntoIterator<Item = &'a str>,
{
    if location.is_root() {
        return PathKind::Directory;
    }

    let prefix: String = location.prefix();
    let mut kind: PathKind = PathKind::Absent;
    for key in keys {
        if key == location.key {
            return PathKind::File;
        }
        if key.starts_with(prefix.as_str()) {
            kind = PathKind::Directory;
        }
    }
    kind
}
