//! Shared types and utilities for rusty-cloudpath.
//!
//! This crate provides common functionality used across all rusty-cloudpath crates:
//! - Lexical POSIX path arithmetic (join, parent, name, suffix handling)
//! - Shared constants (environment variable names, scheme separator)
//! - Shared error types

pub mod constants;
pub mod error;
pub mod path_utils;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use path_utils::{
    file_name, file_stem, file_suffix, file_suffixes, is_relative_to, join_posix, parent_posix,
    posix_components, relative_posix, resolve_posix, validate_name,
};
