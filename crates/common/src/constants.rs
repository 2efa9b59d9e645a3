//! Shared constants used across rusty-cloudpath crates.

use std::time::Duration;

/// Separator between a URI scheme and the rest of a cloud path (`s3://bucket/key`).
pub const SCHEME_SEPARATOR: &str = "://";

/// Separator between path components in cloud keys.
pub const POSIX_SEPARATOR: char = '/';

/// Environment variable naming the default local cache root.
/// An empty value is treated as unset.
pub const ENV_LOCAL_CACHE_DIR: &str = "CLOUDPATH_LOCAL_CACHE_DIR";

/// Environment variable naming the default cache mode.
pub const ENV_FILE_CACHE_MODE: &str = "CLOUDPATH_FILE_CACHE_MODE";

/// Environment variable turning on forced downloads by default.
pub const ENV_FORCE_OVERWRITE_FROM_CLOUD: &str = "CLOUDPATH_FORCE_OVERWRITE_FROM_CLOUD";

/// Environment variable turning on forced uploads by default.
pub const ENV_FORCE_OVERWRITE_TO_CLOUD: &str = "CLOUDPATH_FORCE_OVERWRITE_TO_CLOUD";

/// Prefix for cache roots allocated in the OS temporary directory.
pub const TEMP_CACHE_DIR_PREFIX: &str = "cloudpath-cache-";

/// How far past its pre-write mtime a freshly written mirror is pushed when
/// the filesystem clock reports it as not newer.
pub const WRITE_MTIME_BUMP: Duration = Duration::from_secs(1);
