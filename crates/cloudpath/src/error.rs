//! Error types for cloud path operations.

use std::path::Path;

use rusty_cloudpath_common::PathError;
use rusty_cloudpath_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during cloud path operations.
#[derive(Debug, Error)]
pub enum CloudPathError {
    /// No registered scheme matches the URI.
    #[error("'{uri}' does not start with a registered cloud scheme")]
    InvalidPrefix { uri: String },

    /// The provider is registered but its connector is not available.
    #[error("Missing dependencies for '{scheme}': {message}")]
    MissingDependencies { scheme: String, message: String },

    /// A URI was handed to a client serving a different scheme.
    #[error("Client for '{client_scheme}' cannot handle '{uri}'")]
    ClientMismatch { client_scheme: String, uri: String },

    /// Invalid client or environment configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The mirror has unpushed local writes that a download would destroy.
    #[error(
        "Local file {local_path} for {cloud_path} has unpushed writes \
         (local mtime {local_mtime:.3}, remote mtime {remote_mtime:.3}); \
         push it first or force the download"
    )]
    OverwriteDirtyFile {
        cloud_path: String,
        local_path: String,
        local_mtime: f64,
        remote_mtime: f64,
    },

    /// The mirror was modified outside this library and is newer than the remote.
    #[error(
        "Local file {local_path} for {cloud_path} is newer than the cloud copy \
         (local mtime {local_mtime:.3}, remote mtime {remote_mtime:.3}); \
         force the download to discard local changes"
    )]
    OverwriteNewerLocal {
        cloud_path: String,
        local_path: String,
        local_mtime: f64,
        remote_mtime: f64,
    },

    /// The remote object is at least as new as the local file being pushed.
    #[error(
        "Cloud object {cloud_path} is not older than local file {local_path} \
         (local mtime {local_mtime:.3}, remote mtime {remote_mtime:.3}); \
         force the upload to overwrite it"
    )]
    OverwriteNewerCloud {
        cloud_path: String,
        local_path: String,
        local_mtime: f64,
        remote_mtime: f64,
    },

    /// The operation needs a file.
    #[error("{path} is not a file")]
    NotAFile { path: String },

    /// The operation cannot be applied to a directory.
    #[error("{path} is a directory")]
    IsADirectory { path: String },

    /// The operation needs a directory.
    #[error("{path} is not a directory")]
    NotADirectory { path: String },

    /// Something already exists where the operation wanted to create it.
    #[error("{path} already exists")]
    FileExists { path: String },

    /// Nothing exists at the path.
    #[error("{path} does not exist")]
    FileNotFound { path: String },

    /// A directory that must be empty is not.
    #[error("Directory {path} is not empty")]
    DirectoryNotEmpty { path: String },

    /// Stat was requested for something that is not an object.
    #[error("No stat information available for {path}")]
    NoStat { path: String },

    /// Malformed path or path component.
    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    /// The request is well-formed but deliberately unsupported.
    #[error("Not implemented: {message}")]
    NotImplemented { message: String },

    /// Malformed glob pattern.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Connector failure, passed through unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Local filesystem failure.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },
}

impl CloudPathError {
    /// Build an `Io` error tagged with the local path it happened on.
    pub(crate) fn io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        CloudPathError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this is one of the three coherency conflicts.
    ///
    /// Conflicts are always recoverable: retry with a force flag or resolve the
    /// divergence by hand.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CloudPathError::OverwriteDirtyFile { .. }
                | CloudPathError::OverwriteNewerLocal { .. }
                | CloudPathError::OverwriteNewerCloud { .. }
        )
    }

    /// Whether this error came from scheme dispatch.
    pub fn is_dispatch_error(&self) -> bool {
        matches!(
            self,
            CloudPathError::InvalidPrefix { .. }
                | CloudPathError::MissingDependencies { .. }
                | CloudPathError::ClientMismatch { .. }
        )
    }
}

impl From<PathError> for CloudPathError {
    fn from(err: PathError) -> Self {
        CloudPathError::InvalidPath {
            message: err.to_string(),
        }
    }
}
