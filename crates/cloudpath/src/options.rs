//! Cache modes, write modes and environment-driven defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rusty_cloudpath_common::{
    ENV_FILE_CACHE_MODE, ENV_FORCE_OVERWRITE_FROM_CLOUD, ENV_FORCE_OVERWRITE_TO_CLOUD,
    ENV_LOCAL_CACHE_DIR,
};
use serde::{Deserialize, Serialize};

use crate::error::CloudPathError;

/// When local mirrors are deleted after use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Never deleted by this library.
    Persistent,
    /// Deleted when the client is destroyed.
    #[default]
    TmpDir,
    /// Deleted when the path value that staged it is dropped.
    #[serde(alias = "cloudpath_object")]
    ObjectScoped,
    /// Deleted as soon as the read or write that staged it completes.
    #[serde(alias = "close_file")]
    CloseOnFile,
}

impl CacheMode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Persistent => "persistent",
            CacheMode::TmpDir => "tmp_dir",
            CacheMode::ObjectScoped => "object_scoped",
            CacheMode::CloseOnFile => "close_on_file",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = CloudPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" => Ok(CacheMode::Persistent),
            "tmp_dir" => Ok(CacheMode::TmpDir),
            "object_scoped" | "cloudpath_object" => Ok(CacheMode::ObjectScoped),
            "close_on_file" | "close_file" => Ok(CacheMode::CloseOnFile),
            other => Err(CloudPathError::InvalidConfiguration {
                message: format!(
                    "unknown cache mode '{}', expected one of persistent, tmp_dir, \
                     object_scoped, close_on_file",
                    other
                ),
            }),
        }
    }
}

/// How a path is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Create or truncate.
    #[default]
    Write,
    /// Create or append to the current content.
    Append,
    /// Create; fail with `FileExists` if the object already exists.
    CreateNew,
    /// Read and write the current content without truncating.
    ReadWrite,
}

/// Per-call overrides of the coherency checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForceOverwrite {
    /// Always re-download, discarding local divergence.
    pub from_cloud: bool,
    /// Always upload, even when the remote is not older.
    pub to_cloud: bool,
}

/// Client defaults taken from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    /// `CLOUDPATH_LOCAL_CACHE_DIR`
    pub cache_root: Option<PathBuf>,
    /// `CLOUDPATH_FILE_CACHE_MODE`
    pub cache_mode: Option<CacheMode>,
    /// `CLOUDPATH_FORCE_OVERWRITE_FROM_CLOUD`
    pub force_overwrite_from_cloud: bool,
    /// `CLOUDPATH_FORCE_OVERWRITE_TO_CLOUD`
    pub force_overwrite_to_cloud: bool,
}

impl EnvDefaults {
    /// Read defaults from the process environment.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` when the cache mode variable holds an
    /// unknown value.
    pub fn from_env() -> Result<Self, CloudPathError> {
        Self::from_lookup(|name: &str| std::env::var(name).ok())
    }

    /// Read defaults from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, or `None` when unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CloudPathError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v: &String| !v.trim().is_empty());
        let flag = |name: &str| {
            non_empty(name)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let cache_mode: Option<CacheMode> = match non_empty(ENV_FILE_CACHE_MODE) {
            Some(value) => Some(value.parse()?),
            None => None,
        };

        Ok(Self {
            cache_root: non_empty(ENV_LOCAL_CACHE_DIR).map(PathBuf::from),
            cache_mode,
            force_overwrite_from_cloud: flag(ENV_FORCE_OVERWRITE_FROM_CLOUD),
            force_overwrite_to_cloud: flag(ENV_FORCE_OVERWRITE_TO_CLOUD),
        })
    }
}
