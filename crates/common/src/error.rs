//! Shared error types used across rusty-cloudpath crates.

use thiserror::Error;

/// Path-related errors shared across crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path is invalid or malformed.
    #[error("Invalid path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: String,
    },

    /// A single path component is not acceptable where it is used.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Path is not inside the expected base path.
    #[error("Path {path} is not relative to {base}")]
    NotRelative {
        /// The path that was checked.
        path: String,
        /// The base it should be under.
        base: String,
    },
}
