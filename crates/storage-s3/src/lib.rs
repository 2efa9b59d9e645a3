//! AWS SDK S3 connector for rusty-cloudpath.
//!
//! This crate provides a `StorageBackend` implementation using the AWS SDK for
//! Rust. It works against AWS S3 and S3-compatible endpoints.
//!
//! # Example
//!
//! ```ignore
//! use rusty_cloudpath_storage_s3::{S3StorageBackend, StorageSettings};
//!
//! let settings = StorageSettings::from_env();
//! let backend = S3StorageBackend::new(settings).await?;
//! ```

mod client;
mod error;
mod settings;

pub use client::S3StorageBackend;
pub use error::S3Error;
pub use settings::{AwsCredentials, StorageSettings};
