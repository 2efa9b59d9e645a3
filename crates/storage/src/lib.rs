//! Backend connector abstraction for rusty-cloudpath.
//!
//! This crate defines the small set of raw operations the cloud-path core needs
//! from a remote object store, and ships two connectors that need no network:
//!
//! - **MemoryBackend** - objects in process memory, with call counters
//! - **LocalBackend** - a local directory tree standing in for a bucket store
//!
//! # Directory emulation
//!
//! Object stores have flat key spaces. The `listing` module turns a set of keys
//! into the file/directory hierarchy every connector reports, so connectors
//! built on flat listings behave the same way.

pub mod listing;
mod error;
mod local;
mod memory;
mod traits;
mod types;

pub use error::StorageError;
pub use listing::{classify_from_keys, list_from_keys, ListingBuilder};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use traits::{slice_range, ListStream, StorageBackend};
pub use types::{
    epoch_seconds, truncate_to_millis, ListEntry, ObjectLocation, ObjectMetadata, PathKind,
};
