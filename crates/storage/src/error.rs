//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during backend connector operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object or prefix not found in the remote store.
    #[error("Object not found: {location}")]
    NotFound { location: String },

    /// Access denied.
    #[error("Access denied to {location}: {message}")]
    AccessDenied { location: String, message: String },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Build a `NotFound` error for anything displayable as a location.
    pub fn not_found(location: impl ToString) -> Self {
        StorageError::NotFound {
            location: location.to_string(),
        }
    }

    /// Build an `IoError` tagged with the local path it happened on.
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Check if this error is the connector's "not found" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Check if this error is retryable.
    ///
    /// Nothing in this workspace retries; the flag is passed through so callers
    /// can build their own policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Other { .. } => false,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err: StorageError = StorageError::not_found("bucket/key.txt");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Object not found: bucket/key.txt");
    }

    #[test]
    fn test_network_error_retryable_flag() {
        let err: StorageError = StorageError::NetworkError {
            message: "timeout".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }
}
