//! The cloud path handle.
//!
//! A [`CloudPath`] is an immutable value naming one remote location
//! (`scheme://drive/key`). Path arithmetic is purely lexical; anything that
//! needs bytes goes through the client's cache coherency engine, and anything
//! directory-shaped goes through the connector's listing.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::ops::Div;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use rusty_cloudpath_common::{
    file_name, file_stem, file_suffix, file_suffixes, is_relative_to, join_posix, parent_posix,
    posix_components, relative_posix, resolve_posix, validate_name, SCHEME_SEPARATOR,
};
use rusty_cloudpath_storage::{
    epoch_seconds, truncate_to_millis, ListEntry, ListStream, ObjectLocation, ObjectMetadata,
    PathKind, StorageBackend,
};
use walkdir::WalkDir;

use crate::anypath::AnyPath;
use crate::cache::{local_mtime, Refresh};
use crate::client::Client;
use crate::error::CloudPathError;
use crate::glob::{self, GlobStream};
use crate::io::{CloudReader, CloudStreamReader, CloudWriter, StreamReaderFactory};
use crate::options::{CacheMode, ForceOverwrite, OpenMode};
use crate::registry;

/// Lazy sequence of paths.
pub type PathStream = BoxStream<'static, Result<CloudPath, CloudPathError>>;

/// State shared by clones of one path value.
///
/// In `object_scoped` mode the mirror goes away with the last clone.
struct PathState {
    client: Client,
    mirror: PathBuf,
}

impl Drop for PathState {
    fn drop(&mut self) {
        if self.client.cache_mode() == CacheMode::ObjectScoped && self.mirror.is_file() {
            self.client.inner.remove_mirror(&self.mirror);
        }
    }
}

/// Path-like handle to a remote object or prefix.
#[derive(Clone)]
pub struct CloudPath {
    uri: String,
    location: ObjectLocation,
    state: Arc<PathState>,
}

impl CloudPath {
    /// Build a path through the default client of the URI's scheme.
    ///
    /// # Errors
    /// Returns `InvalidPrefix` for unregistered schemes and
    /// `MissingDependencies` when the scheme has no connector.
    pub async fn from_uri(uri: &str) -> Result<Self, CloudPathError> {
        let implementation: registry::Implementation = registry::dispatch(uri)?;
        implementation.validate_completeness()?;
        let client: Client = Client::get_or_create_default(&implementation.scheme).await?;
        client.path(uri)
    }

    pub(crate) fn with_client(client: Client, uri: &str) -> Result<Self, CloudPathError> {
        let (scheme, rest) =
            registry::split_scheme(uri).ok_or_else(|| CloudPathError::InvalidPrefix {
                uri: uri.to_string(),
            })?;

        if !scheme.eq_ignore_ascii_case(client.scheme()) {
            return Err(CloudPathError::ClientMismatch {
                client_scheme: client.scheme().to_string(),
                uri: uri.to_string(),
            });
        }

        let parts: Vec<&str> = posix_components(rest);
        let (drive, key_parts) = match parts.split_first() {
            Some((drive, key_parts)) if *drive != ".." => (*drive, key_parts),
            _ => {
                return Err(CloudPathError::InvalidPath {
                    message: format!("'{}' has no {}", uri, client.provider().drive_label()),
                })
            }
        };

        let key: String = resolve_posix(&key_parts.join("/"));
        Ok(Self::from_location(&client, ObjectLocation::new(drive, key)))
    }

    pub(crate) fn from_location(client: &Client, location: ObjectLocation) -> Self {
        let uri: String = format!("{}{}{}", client.scheme(), SCHEME_SEPARATOR, location);
        let mirror: PathBuf = client.mirror_path(&location);
        Self {
            uri,
            location,
            state: Arc::new(PathState {
                client: client.clone(),
                mirror,
            }),
        }
    }

    pub(crate) fn with_key(&self, key: &str) -> Self {
        Self::from_location(
            self.client(),
            ObjectLocation::new(self.location.drive.clone(), key),
        )
    }

    // ---------------------------------------------------------------------
    // Pure path arithmetic
    // ---------------------------------------------------------------------

    /// Canonical URI, e.g. `s3://bucket/dir/file.txt`.
    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    /// Client serving this path.
    pub fn client(&self) -> &Client {
        &self.state.client
    }

    /// Remote location addressed by this path.
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// `scheme://`
    pub fn anchor(&self) -> String {
        format!("{}{}", self.client().scheme(), SCHEME_SEPARATOR)
    }

    /// Bucket or container.
    pub fn drive(&self) -> &str {
        &self.location.drive
    }

    /// Object key without leading separator, `""` at the drive root.
    pub fn key(&self) -> &str {
        &self.location.key
    }

    fn posix(&self) -> String {
        if self.location.key.is_empty() {
            format!("/{}", self.location.drive)
        } else {
            format!("/{}/{}", self.location.drive, self.location.key)
        }
    }

    /// Final component; the drive name at the drive root.
    pub fn name(&self) -> &str {
        if self.location.key.is_empty() {
            &self.location.drive
        } else {
            file_name(&self.location.key)
        }
    }

    /// Final component without its last suffix.
    pub fn stem(&self) -> &str {
        file_stem(self.name())
    }

    /// Last suffix of the final component, including the dot.
    pub fn suffix(&self) -> &str {
        file_suffix(self.name())
    }

    /// Every suffix of the final component.
    pub fn suffixes(&self) -> Vec<String> {
        file_suffixes(self.name())
    }

    /// `[anchor, drive, key components...]`
    pub fn parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = vec![self.anchor(), self.location.drive.clone()];
        parts.extend(posix_components(&self.location.key).into_iter().map(String::from));
        parts
    }

    /// Parent path. The parent of a drive root is the drive root.
    pub fn parent(&self) -> CloudPath {
        if self.location.key.is_empty() {
            return self.clone();
        }
        self.with_key(&parent_posix(&self.rooted_key()))
    }

    /// Every ancestor, nearest first, ending with the drive root.
    pub fn parents(&self) -> Vec<CloudPath> {
        let mut parents: Vec<CloudPath> = Vec::new();
        let mut current: CloudPath = self.clone();
        while !current.location.is_root() {
            current = current.parent();
            parents.push(current.clone());
        }
        parents
    }

    /// Join a relative key (which may contain `/`, `.` and `..`).
    ///
    /// `..` never climbs above the drive root. A segment starting with `/`
    /// starts over from the scheme: its first component becomes the drive.
    pub fn join(&self, segment: &str) -> CloudPath {
        let joined: String = join_posix(&self.rooted_key(), segment);
        if !segment.starts_with('/') {
            return self.with_key(&joined);
        }

        match posix_components(&joined).split_first() {
            Some((drive, rest)) => Self::from_location(
                self.client(),
                ObjectLocation::new(*drive, rest.join("/")),
            ),
            None => self.with_key(""),
        }
    }

    /// The key as an absolute POSIX path below the drive.
    fn rooted_key(&self) -> String {
        format!("/{}", self.location.key)
    }

    /// Join several segments in order.
    pub fn joinpath<I, S>(&self, segments: I) -> CloudPath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .fold(self.clone(), |path: CloudPath, segment: S| path.join(segment.as_ref()))
    }

    /// Same parent, different final component.
    ///
    /// # Errors
    /// Returns `InvalidPath` for the drive root or an unusable name.
    pub fn with_name(&self, name: &str) -> Result<CloudPath, CloudPathError> {
        validate_name(name)?;
        if self.location.is_root() {
            return Err(CloudPathError::InvalidPath {
                message: format!("{} has no name to replace", self.uri),
            });
        }
        Ok(self.parent().join(name))
    }

    /// Same parent and suffix, different stem.
    pub fn with_stem(&self, stem: &str) -> Result<CloudPath, CloudPathError> {
        self.with_name(&format!("{}{}", stem, self.suffix()))
    }

    /// Replace (or remove, with `""`) the last suffix.
    ///
    /// # Errors
    /// Returns `InvalidPath` when `suffix` is not empty and not of the form `.ext`.
    pub fn with_suffix(&self, suffix: &str) -> Result<CloudPath, CloudPathError> {
        let valid: bool = suffix.is_empty()
            || (suffix.starts_with('.') && suffix.len() > 1 && !suffix.contains('/'));
        if !valid {
            return Err(CloudPathError::InvalidPath {
                message: format!("invalid suffix '{}'", suffix),
            });
        }
        self.with_name(&format!("{}{}", self.stem(), suffix))
    }

    /// Whether the path matches a glob pattern.
    ///
    /// Relative patterns match from the right; patterns starting with `/` or
    /// with this path's `scheme://` must match the whole path.
    pub fn match_pattern(&self, pattern: &str) -> Result<bool, CloudPathError> {
        let anchor: String = self.anchor();
        let pattern: String = if pattern.contains(SCHEME_SEPARATOR) {
            let lowered: String = pattern.to_ascii_lowercase();
            if !lowered.starts_with(&anchor) {
                return Ok(false);
            }
            format!("/{}", &pattern[anchor.len()..])
        } else {
            pattern.to_string()
        };

        let path: String = self.posix();
        glob::match_path(
            &posix_components(&path),
            &pattern,
            self.client().provider().case_sensitive(),
        )
    }

    /// Whether this path equals `other` or lies underneath it.
    pub fn is_relative_to(&self, other: &CloudPath) -> bool {
        self.client().scheme() == other.client().scheme()
            && is_relative_to(&self.posix(), &other.posix())
    }

    /// This path relative to an ancestor, as a POSIX string.
    ///
    /// # Errors
    /// Returns `InvalidPath` when `other` is not an ancestor.
    pub fn relative_to(&self, other: &CloudPath) -> Result<String, CloudPathError> {
        if self.client().scheme() != other.client().scheme() {
            return Err(CloudPathError::InvalidPath {
                message: format!("{} is not relative to {}", self.uri, other.uri),
            });
        }
        Ok(relative_posix(&self.posix(), &other.posix())?)
    }

    /// Where this path's mirror lives (or would live) in the cache.
    pub fn local_cache_path(&self) -> &Path {
        &self.state.mirror
    }

    fn backend(&self) -> &Arc<dyn StorageBackend> {
        self.client().backend()
    }

    // ---------------------------------------------------------------------
    // Remote metadata
    // ---------------------------------------------------------------------

    /// Whether anything exists at this path.
    pub async fn exists(&self) -> Result<bool, CloudPathError> {
        Ok(self.backend().exists(&self.location).await?)
    }

    /// Whether this path is a single object.
    pub async fn is_file(&self) -> Result<bool, CloudPathError> {
        Ok(self.backend().classify(&self.location).await? == PathKind::File)
    }

    /// Whether this path is a prefix with objects beneath it.
    pub async fn is_dir(&self) -> Result<bool, CloudPathError> {
        Ok(self.backend().classify(&self.location).await? == PathKind::Directory)
    }

    /// Remote size, last-modified time and etag.
    ///
    /// # Errors
    /// Returns `NoStat` for directories and absent paths.
    pub async fn stat(&self) -> Result<ObjectMetadata, CloudPathError> {
        match self.backend().get_metadata(&self.location).await {
            Ok(meta) => Ok(meta),
            Err(err) if err.is_not_found() => Err(CloudPathError::NoStat {
                path: self.uri.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Remote etag, if the store reports one.
    pub async fn etag(&self) -> Result<Option<String>, CloudPathError> {
        Ok(self.stat().await?.etag)
    }

    // ---------------------------------------------------------------------
    // Hierarchy
    // ---------------------------------------------------------------------

    async fn require_dir(&self) -> Result<(), CloudPathError> {
        match self.backend().classify(&self.location).await? {
            PathKind::Directory => Ok(()),
            PathKind::File => Err(CloudPathError::NotADirectory {
                path: self.uri.clone(),
            }),
            PathKind::Absent => Err(CloudPathError::FileNotFound {
                path: self.uri.clone(),
            }),
        }
    }

    /// Immediate children of a directory, listed lazily as the stream is polled.
    ///
    /// # Errors
    /// Returns `NotADirectory` for files and `FileNotFound` for absent paths.
    /// Listing failures come out of the stream.
    pub async fn iterdir(&self) -> Result<PathStream, CloudPathError> {
        self.require_dir().await?;
        let client: Client = self.client().clone();
        let own: ObjectLocation = self.location.clone();
        Ok(self
            .backend()
            .list_children(&self.location, false)
            .try_filter(move |entry: &ListEntry| future::ready(entry.location != own))
            .map_ok(move |entry: ListEntry| Self::from_location(&client, entry.location))
            .map_err(CloudPathError::from)
            .boxed())
    }

    /// Lazily match a relative glob pattern below this path.
    ///
    /// Matching is case sensitive when the provider is.
    pub fn glob(&self, pattern: &str) -> Result<GlobStream, CloudPathError> {
        self.glob_with(pattern, None)
    }

    /// Like [`CloudPath::glob`] with an explicit case sensitivity.
    pub fn glob_with(
        &self,
        pattern: &str,
        case_sensitive: Option<bool>,
    ) -> Result<GlobStream, CloudPathError> {
        let case_sensitive: bool =
            case_sensitive.unwrap_or_else(|| self.client().provider().case_sensitive());
        glob::glob_stream(self, pattern, case_sensitive)
    }

    /// Glob at every depth: `rglob("*.txt")` is `glob("**/*.txt")`.
    pub fn rglob(&self, pattern: &str) -> Result<GlobStream, CloudPathError> {
        self.glob(&format!("**/{}", pattern))
    }

    // ---------------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------------

    /// Make the local mirror current and return its path.
    ///
    /// # Arguments
    /// * `force` - Re-download even over dirty or newer local content
    pub async fn ensure_local(&self, force: bool) -> Result<PathBuf, CloudPathError> {
        let force: bool = force || self.client().inner.force_overwrite_from_cloud;
        match self.client().refresh_for_read(&self.location, force).await? {
            Refresh::RemoteAbsent => Err(CloudPathError::FileNotFound {
                path: self.uri.clone(),
            }),
            Refresh::Downloaded | Refresh::Hit => Ok(self.state.mirror.clone()),
        }
    }

    /// Push the local mirror to the remote object.
    pub async fn push_to_remote(&self, force: bool) -> Result<(), CloudPathError> {
        let force: bool = force || self.client().inner.force_overwrite_to_cloud;
        self.client().push_to_remote(&self.location, force).await
    }

    fn evict_after_use(&self) {
        if self.client().cache_mode() == CacheMode::CloseOnFile {
            self.client().inner.remove_mirror(&self.state.mirror);
        }
    }

    /// Read the whole object.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, CloudPathError> {
        let mirror: PathBuf = self.ensure_local(false).await?;
        let data: Vec<u8> = tokio::fs::read(&mirror)
            .await
            .map_err(|e| CloudPathError::io(&mirror, e))?;
        self.evict_after_use();
        Ok(data)
    }

    /// Read the whole object as UTF-8 text.
    pub async fn read_text(&self) -> Result<String, CloudPathError> {
        let data: Vec<u8> = self.read_bytes().await?;
        String::from_utf8(data).map_err(|e| CloudPathError::Io {
            path: self.uri.clone(),
            message: e.to_string(),
        })
    }

    /// Open the mirror for reading.
    pub async fn open_read(&self) -> Result<CloudReader, CloudPathError> {
        self.open_read_with(false).await
    }

    /// Open the mirror for reading, optionally forcing a fresh download.
    pub async fn open_read_with(&self, force_from_cloud: bool) -> Result<CloudReader, CloudPathError> {
        let mirror: PathBuf = self.ensure_local(force_from_cloud).await?;
        let file: std::fs::File =
            std::fs::File::open(&mirror).map_err(|e| CloudPathError::io(&mirror, e))?;
        let evict: bool = self.client().cache_mode() == CacheMode::CloseOnFile;
        Ok(CloudReader::new(file, mirror, self.client().clone(), evict))
    }

    /// Open a streaming reader over the remote object, bypassing the cache.
    ///
    /// The mirror is neither read nor written; content comes from ranged
    /// requests as the reader advances.
    ///
    /// # Errors
    /// * `NotImplemented` - the client has no streaming-reader factory
    /// * `NotAFile` - the path is a directory
    /// * `FileNotFound` - nothing exists at the path
    pub async fn open_stream(&self) -> Result<CloudStreamReader, CloudPathError> {
        let factory: StreamReaderFactory =
            self.client().inner.raw_io.clone().ok_or_else(|| CloudPathError::NotImplemented {
                message: format!("streaming reads are not enabled for {}://", self.client().scheme()),
            })?;

        let meta: ObjectMetadata = match self.backend().get_metadata(&self.location).await {
            Ok(meta) => meta,
            Err(err) if err.is_not_found() => {
                return match self.backend().classify(&self.location).await? {
                    PathKind::Directory => Err(CloudPathError::NotAFile {
                        path: self.uri.clone(),
                    }),
                    _ => Err(CloudPathError::FileNotFound {
                        path: self.uri.clone(),
                    }),
                };
            }
            Err(err) => return Err(err.into()),
        };
        log::debug!("Streaming {} ({} bytes)", self.uri, meta.size);
        Ok(factory(Arc::clone(self.backend()), self.location.clone(), meta.size))
    }

    /// Open for writing; the remote object is updated when the writer closes.
    pub async fn open_write(&self, mode: OpenMode) -> Result<CloudWriter, CloudPathError> {
        self.open_write_with(mode, ForceOverwrite::default()).await
    }

    /// Open for writing with explicit force flags.
    ///
    /// # Errors
    /// * `IsADirectory` - the path is a directory
    /// * `FileExists` - `mode` is `CreateNew` and the object exists
    /// * any refresh-for-read conflict
    pub async fn open_write_with(
        &self,
        mode: OpenMode,
        force: ForceOverwrite,
    ) -> Result<CloudWriter, CloudPathError> {
        match self.backend().classify(&self.location).await? {
            PathKind::Directory => {
                return Err(CloudPathError::IsADirectory {
                    path: self.uri.clone(),
                })
            }
            PathKind::File if mode == OpenMode::CreateNew => {
                return Err(CloudPathError::FileExists {
                    path: self.uri.clone(),
                })
            }
            _ => {}
        }

        let from_cloud: bool = force.from_cloud || self.client().inner.force_overwrite_from_cloud;
        self.client().refresh_for_read(&self.location, from_cloud).await?;

        let mirror: &Path = &self.state.mirror;
        if mirror.is_dir() {
            return Err(CloudPathError::IsADirectory {
                path: mirror.display().to_string(),
            });
        }
        let original_mtime: Option<SystemTime> = local_mtime(mirror)?;

        if let Some(parent) = mirror.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CloudPathError::io(parent, e))?;
        }

        let mut options: std::fs::OpenOptions = std::fs::OpenOptions::new();
        match mode {
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
            OpenMode::CreateNew => options.write(true).create_new(true),
            OpenMode::ReadWrite => options.read(true).write(true).create(true),
        };
        let file: std::fs::File = options
            .open(mirror)
            .map_err(|e| CloudPathError::io(mirror, e))?;

        self.client().mark_dirty(mirror);
        let to_cloud: bool = force.to_cloud || self.client().inner.force_overwrite_to_cloud;
        Ok(CloudWriter::new(self.clone(), file, original_mtime, to_cloud))
    }

    /// Run `f` against a writer, then close it and push, whatever `f` returned.
    ///
    /// # Returns
    /// The closure's value. A closure error wins over a push error.
    pub async fn write_with<T, F>(&self, mode: OpenMode, f: F) -> Result<T, CloudPathError>
    where
        F: FnOnce(&mut CloudWriter) -> std::io::Result<T>,
    {
        let mut writer: CloudWriter = self.open_write(mode).await?;
        let result: std::io::Result<T> = f(&mut writer);
        let closed: Result<(), CloudPathError> = writer.close().await;

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    log::warn!("Failed to push {} after a failed write: {}", self.uri, close_err);
                }
                Err(CloudPathError::io(&self.state.mirror, err))
            }
        }
    }

    /// Replace the object's content.
    pub async fn write_bytes(&self, data: &[u8]) -> Result<(), CloudPathError> {
        self.write_with(OpenMode::Write, |writer: &mut CloudWriter| writer.write_all(data))
            .await
    }

    /// Replace the object's content with UTF-8 text.
    pub async fn write_text(&self, text: &str) -> Result<(), CloudPathError> {
        self.write_bytes(text.as_bytes()).await
    }

    /// A real local file for this path, for APIs that need one.
    ///
    /// Files are refreshed first; other paths return the would-be mirror
    /// location without touching it.
    pub async fn fspath(&self) -> Result<PathBuf, CloudPathError> {
        if self.is_file().await? {
            return self.ensure_local(false).await;
        }
        Ok(self.state.mirror.clone())
    }

    // ---------------------------------------------------------------------
    // Transfers and mutation
    // ---------------------------------------------------------------------

    /// Download a file or a whole tree to a local destination, bypassing the cache.
    ///
    /// A file downloaded into an existing directory keeps its name.
    pub async fn download_to(&self, dest: impl AsRef<Path>) -> Result<PathBuf, CloudPathError> {
        let dest: &Path = dest.as_ref();
        match self.backend().classify(&self.location).await? {
            PathKind::File => {
                let target: PathBuf = if dest.is_dir() {
                    dest.join(self.name())
                } else {
                    dest.to_path_buf()
                };
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| CloudPathError::io(parent, e))?;
                }
                self.backend().download(&self.location, &target).await?;
                Ok(target)
            }
            PathKind::Directory => {
                std::fs::create_dir_all(dest).map_err(|e| CloudPathError::io(dest, e))?;
                let mut entries: ListStream = self.backend().list_children(&self.location, true);
                while let Some(entry) = entries.try_next().await? {
                    let relative: String = relative_posix(
                        &format!("/{}", entry.location.key),
                        &format!("/{}", self.location.key),
                    )?;
                    let target: PathBuf = posix_components(&relative)
                        .into_iter()
                        .fold(dest.to_path_buf(), |path: PathBuf, part: &str| path.join(part));

                    if entry.is_dir {
                        std::fs::create_dir_all(&target)
                            .map_err(|e| CloudPathError::io(&target, e))?;
                        continue;
                    }
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| CloudPathError::io(parent, e))?;
                    }
                    self.backend().download(&entry.location, &target).await?;
                }
                Ok(dest.to_path_buf())
            }
            PathKind::Absent => Err(CloudPathError::FileNotFound {
                path: self.uri.clone(),
            }),
        }
    }

    async fn upload_file(&self, src: &Path, force: bool) -> Result<(), CloudPathError> {
        if !force {
            match self.backend().get_metadata(&self.location).await {
                Ok(remote) => {
                    let local: SystemTime =
                        local_mtime(src)?.ok_or_else(|| CloudPathError::FileNotFound {
                            path: src.display().to_string(),
                        })?;
                    if truncate_to_millis(local) <= truncate_to_millis(remote.last_modified) {
                        return Err(CloudPathError::OverwriteNewerCloud {
                            cloud_path: self.uri.clone(),
                            local_path: src.display().to_string(),
                            local_mtime: epoch_seconds(local),
                            remote_mtime: epoch_seconds(remote.last_modified),
                        });
                    }
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.backend().upload(src, &self.location).await?;
        log::debug!("Uploaded {} to {}", src.display(), self.uri);
        Ok(())
    }

    /// Upload a local file or directory tree to this path.
    ///
    /// A file uploaded onto an existing directory keeps its name.
    ///
    /// # Errors
    /// Returns `OverwriteNewerCloud` when a remote object is at least as new
    /// as the local file and `force` is not set.
    pub async fn upload_from(
        &self,
        src: impl AsRef<Path>,
        force: bool,
    ) -> Result<CloudPath, CloudPathError> {
        let src: &Path = src.as_ref();
        let force: bool = force || self.client().inner.force_overwrite_to_cloud;

        if src.is_dir() {
            for entry in WalkDir::new(src).min_depth(1) {
                let entry = entry.map_err(|e| CloudPathError::Io {
                    path: src.display().to_string(),
                    message: e.to_string(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative: Vec<String> = entry
                    .path()
                    .strip_prefix(src)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                self.joinpath(&relative)
                    .upload_file(entry.path(), force)
                    .await?;
            }
            return Ok(self.clone());
        }

        if !src.is_file() {
            return Err(CloudPathError::FileNotFound {
                path: src.display().to_string(),
            });
        }

        let dst: CloudPath = if self.is_dir().await? {
            let name: String = src
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.join(&name)
        } else {
            self.clone()
        };
        dst.upload_file(src, force).await?;
        Ok(dst)
    }

    /// Copy a file to another cloud path or to the local filesystem.
    ///
    /// Same-client copies happen server side; other clients go through this
    /// path's mirror. A destination directory receives the file under its
    /// own name.
    ///
    /// # Errors
    /// * `NotAFile` / `FileNotFound` - this path is not a file
    /// * `OverwriteNewerCloud` - the destination is at least as new and
    ///   `force` is not set
    pub async fn copy(&self, dest: &AnyPath, force: bool) -> Result<AnyPath, CloudPathError> {
        match self.backend().classify(&self.location).await? {
            PathKind::File => {}
            PathKind::Directory => {
                return Err(CloudPathError::NotAFile {
                    path: self.uri.clone(),
                })
            }
            PathKind::Absent => {
                return Err(CloudPathError::FileNotFound {
                    path: self.uri.clone(),
                })
            }
        }

        let dest: &CloudPath = match dest {
            AnyPath::Local(path) => return Ok(AnyPath::Local(self.download_to(path).await?)),
            AnyPath::Cloud(dest) => dest,
        };

        let dest: CloudPath = if dest.is_dir().await? {
            dest.join(self.name())
        } else {
            dest.clone()
        };
        let force: bool = force || dest.client().inner.force_overwrite_to_cloud;

        if dest.client().same_client(self.client()) {
            if !force {
                match dest.backend().get_metadata(&dest.location).await {
                    Ok(remote) => {
                        let source: ObjectMetadata = self.stat().await?;
                        if truncate_to_millis(source.last_modified)
                            <= truncate_to_millis(remote.last_modified)
                        {
                            return Err(CloudPathError::OverwriteNewerCloud {
                                cloud_path: dest.uri.clone(),
                                local_path: self.uri.clone(),
                                local_mtime: epoch_seconds(source.last_modified),
                                remote_mtime: epoch_seconds(remote.last_modified),
                            });
                        }
                    }
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err.into()),
                }
            }
            self.backend()
                .move_object(&self.location, &dest.location, false)
                .await?;
        } else {
            let local: PathBuf = self.fspath().await?;
            dest.upload_file(&local, force).await?;
            self.evict_after_use();
        }

        Ok(AnyPath::Cloud(dest))
    }

    /// Copy every file below this directory to a destination directory.
    pub async fn copytree(&self, dest: &AnyPath, force: bool) -> Result<AnyPath, CloudPathError> {
        self.require_dir().await?;

        let dest: &CloudPath = match dest {
            AnyPath::Local(path) => return Ok(AnyPath::Local(self.download_to(path).await?)),
            AnyPath::Cloud(dest) => dest,
        };
        if dest.is_file().await? {
            return Err(CloudPathError::FileExists {
                path: dest.uri.clone(),
            });
        }

        let mut entries: ListStream = self.backend().list_children(&self.location, true);
        while let Some(entry) = entries.try_next().await? {
            if entry.is_dir {
                continue;
            }
            let source: CloudPath = Self::from_location(self.client(), entry.location);
            let relative: String = source.relative_to(self)?;
            source
                .copy(&AnyPath::Cloud(dest.join(&relative)), force)
                .await?;
        }
        Ok(AnyPath::Cloud(dest.clone()))
    }

    /// Move this file or directory to `target`.
    pub async fn rename(&self, target: &CloudPath) -> Result<CloudPath, CloudPathError> {
        if self == target {
            return Ok(target.clone());
        }
        let same_client: bool = target.client().same_client(self.client());

        match self.backend().classify(&self.location).await? {
            PathKind::File if same_client => {
                self.backend()
                    .move_object(&self.location, &target.location, true)
                    .await?;
                self.client().inner.remove_mirror(&self.state.mirror);
            }
            PathKind::File => {
                self.copy(&AnyPath::Cloud(target.clone()), true).await?;
                self.unlink(false).await?;
            }
            PathKind::Directory if same_client => {
                let mut entries: ListStream = self.backend().list_children(&self.location, true);
                while let Some(entry) = entries.try_next().await? {
                    if entry.is_dir {
                        continue;
                    }
                    let source: CloudPath = Self::from_location(self.client(), entry.location);
                    let destination: CloudPath = target.join(&source.relative_to(self)?);
                    self.backend()
                        .move_object(&source.location, &destination.location, true)
                        .await?;
                }
                self.backend().delete(&self.location).await?;
                self.clear_cache();
            }
            PathKind::Directory => {
                self.copytree(&AnyPath::Cloud(target.clone()), true).await?;
                self.rmtree().await?;
            }
            PathKind::Absent => {
                return Err(CloudPathError::FileNotFound {
                    path: self.uri.clone(),
                })
            }
        }

        log::debug!("Moved {} to {}", self.uri, target.uri);
        Ok(target.clone())
    }

    /// Same as [`CloudPath::rename`]; object stores overwrite unconditionally.
    pub async fn replace(&self, target: &CloudPath) -> Result<CloudPath, CloudPathError> {
        self.rename(target).await
    }

    /// Delete this file and its mirror.
    pub async fn unlink(&self, missing_ok: bool) -> Result<(), CloudPathError> {
        match self.backend().classify(&self.location).await? {
            PathKind::Directory => Err(CloudPathError::IsADirectory {
                path: self.uri.clone(),
            }),
            PathKind::Absent if missing_ok => Ok(()),
            PathKind::Absent => Err(CloudPathError::FileNotFound {
                path: self.uri.clone(),
            }),
            PathKind::File => {
                self.backend().delete(&self.location).await?;
                self.client().inner.remove_mirror(&self.state.mirror);
                Ok(())
            }
        }
    }

    /// Delete an empty directory.
    pub async fn rmdir(&self) -> Result<(), CloudPathError> {
        self.require_dir().await?;
        let mut children: ListStream = self.backend().list_children(&self.location, false);
        if children.try_next().await?.is_some() {
            return Err(CloudPathError::DirectoryNotEmpty {
                path: self.uri.clone(),
            });
        }
        self.backend().delete(&self.location).await?;
        Ok(())
    }

    /// Delete a directory and everything below it, remote and cached.
    pub async fn rmtree(&self) -> Result<(), CloudPathError> {
        self.require_dir().await?;
        self.backend().delete(&self.location).await?;
        self.clear_cache();
        Ok(())
    }

    /// Create an empty object, or bump the last-modified time of an existing one.
    pub async fn touch(&self, exist_ok: bool) -> Result<(), CloudPathError> {
        match self.backend().classify(&self.location).await? {
            PathKind::Directory => Err(CloudPathError::IsADirectory {
                path: self.uri.clone(),
            }),
            PathKind::File if !exist_ok => Err(CloudPathError::FileExists {
                path: self.uri.clone(),
            }),
            _ => Ok(self.backend().touch(&self.location).await?),
        }
    }

    /// Create a directory.
    ///
    /// Object stores have no real directories; what happens is up to the
    /// connector (often nothing until a file is written below it).
    pub async fn mkdir(&self, parents: bool, exist_ok: bool) -> Result<(), CloudPathError> {
        match self.backend().classify(&self.location).await? {
            PathKind::File => Err(CloudPathError::FileExists {
                path: self.uri.clone(),
            }),
            PathKind::Directory if exist_ok => Ok(()),
            PathKind::Directory => Err(CloudPathError::FileExists {
                path: self.uri.clone(),
            }),
            PathKind::Absent => {
                let parent: CloudPath = self.parent();
                if !parents
                    && !parent.location.is_root()
                    && self.backend().classify(&parent.location).await? == PathKind::Absent
                {
                    return Err(CloudPathError::FileNotFound {
                        path: parent.uri.clone(),
                    });
                }
                Ok(self.backend().make_dir(&self.location).await?)
            }
        }
    }

    /// Delete this path's mirror (or cached subtree). Mirrors with pending
    /// writes are kept; clearing nothing is fine.
    pub fn clear_cache(&self) {
        self.client().inner.clear_mirrors_under(&self.state.mirror);
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl fmt::Debug for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloudPath({:?})", self.uri)
    }
}

impl PartialEq for CloudPath {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for CloudPath {}

impl Hash for CloudPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

impl PartialOrd for CloudPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CloudPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts().cmp(&other.parts())
    }
}

impl Div<&str> for &CloudPath {
    type Output = CloudPath;

    fn div(self, rhs: &str) -> CloudPath {
        self.join(rhs)
    }
}

impl Div<&str> for CloudPath {
    type Output = CloudPath;

    fn div(self, rhs: &str) -> CloudPath {
        self.join(rhs)
    }
}
