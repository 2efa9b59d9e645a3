//! Error types for the S3 connector.

use rusty_cloudpath_storage::StorageError;
use thiserror::Error;

/// Errors specific to the S3 connector.
#[derive(Error, Debug)]
pub enum S3Error {
    /// AWS SDK error.
    #[error("AWS SDK error: {message}")]
    SdkError { message: String, retryable: bool },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<S3Error> for StorageError {
    fn from(err: S3Error) -> Self {
        match err {
            S3Error::SdkError { message, retryable } => {
                StorageError::NetworkError { message, retryable }
            }
            S3Error::ConfigError(message) => StorageError::InvalidConfig { message },
            S3Error::IoError(e) => StorageError::IoError {
                path: String::new(),
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_error_maps_to_network_error() {
        let err: StorageError = S3Error::SdkError {
            message: "throttled".into(),
            retryable: true,
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_config_error_maps_to_invalid_config() {
        let err: StorageError = S3Error::ConfigError("no region".into()).into();
        assert!(matches!(err, StorageError::InvalidConfig { .. }));
    }
}
