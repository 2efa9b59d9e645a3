//! Path-like handles for remote object stores with a coherent local file cache.
//!
//! A [`CloudPath`] names one object or prefix (`s3://bucket/dir/file.txt`).
//! Path arithmetic never touches the network. Reads and writes stage content
//! through a local mirror kept coherent with the remote object by comparing
//! modification times; directory-shaped operations emulate a hierarchy on top
//! of the connector's listing.
//!
//! # Architecture
//!
//! ```text
//! CloudPath ──► Client ──► cache coherency (mirror mtimes, dirty set)
//!     │            └─────► StorageBackend (connector)
//!     └──► glob selectors ──► StorageBackend::list_children
//! registry: scheme ──► Implementation ──► default Client
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rusty_cloudpath::CloudPath;
//!
//! let path = CloudPath::from_uri("s3://bucket/data/input.csv").await?;
//! let text = path.read_text().await?;
//! path.with_suffix(".bak")?.write_text(&text).await?;
//! ```

pub mod anypath;
pub mod cache;
pub mod client;
pub mod error;
pub mod glob;
pub mod io;
pub mod options;
pub mod path;
pub mod registry;

pub use anypath::AnyPath;
pub use cache::Refresh;
pub use client::{Client, ClientBuilder};
pub use error::CloudPathError;
pub use glob::GlobStream;
pub use io::{
    CloudReader, CloudStreamReader, CloudWriter, StreamReaderFactory, DEFAULT_STREAM_BUFFER_SIZE,
};
pub use options::{CacheMode, EnvDefaults, ForceOverwrite, OpenMode};
pub use path::{CloudPath, PathStream};
pub use registry::{Implementation, Provider};

pub use rusty_cloudpath_storage::{
    ListEntry, ListStream, LocalBackend, MemoryBackend, ObjectLocation, ObjectMetadata, PathKind,
    StorageBackend, StorageError,
};
