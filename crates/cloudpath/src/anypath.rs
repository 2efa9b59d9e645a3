//! Either a cloud path or a local path.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::CloudPathError;
use crate::path::CloudPath;
use crate::registry;

/// A cloud path or a local filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyPath {
    Cloud(CloudPath),
    Local(PathBuf),
}

impl AnyPath {
    /// Parse a string as a cloud URI when a registered scheme matches,
    /// otherwise as a local path.
    ///
    /// # Errors
    /// Fails for registered schemes whose connector is unavailable, or when
    /// the URI has no drive.
    pub async fn parse(s: &str) -> Result<Self, CloudPathError> {
        match registry::dispatch(s) {
            Ok(_) => Ok(AnyPath::Cloud(CloudPath::from_uri(s).await?)),
            Err(_) => Ok(AnyPath::Local(PathBuf::from(s))),
        }
    }

    /// Whether this is a cloud path.
    pub fn is_cloud(&self) -> bool {
        matches!(self, AnyPath::Cloud(_))
    }

    /// The cloud path, if this is one.
    pub fn as_cloud(&self) -> Option<&CloudPath> {
        match self {
            AnyPath::Cloud(path) => Some(path),
            AnyPath::Local(_) => None,
        }
    }

    /// The local path, if this is one.
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            AnyPath::Cloud(_) => None,
            AnyPath::Local(path) => Some(path),
        }
    }
}

impl fmt::Display for AnyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyPath::Cloud(path) => write!(f, "{}", path),
            AnyPath::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<CloudPath> for AnyPath {
    fn from(path: CloudPath) -> Self {
        AnyPath::Cloud(path)
    }
}

impl From<&CloudPath> for AnyPath {
    fn from(path: &CloudPath) -> Self {
        AnyPath::Cloud(path.clone())
    }
}

impl From<PathBuf> for AnyPath {
    fn from(path: PathBuf) -> Self {
        AnyPath::Local(path)
    }
}

impl From<&Path> for AnyPath {
    fn from(path: &Path) -> Self {
        AnyPath::Local(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_local_path() {
        let parsed: AnyPath = AnyPath::parse("/tmp/data/file.txt").await.unwrap();
        assert_eq!(parsed.as_local(), Some(Path::new("/tmp/data/file.txt")));
        assert!(!parsed.is_cloud());

        let unknown: AnyPath = AnyPath::parse("ftp://host/file").await.unwrap();
        assert!(unknown.as_local().is_some());
    }

    #[tokio::test]
    async fn test_parse_unavailable_provider() {
        let result = AnyPath::parse("az://container/blob").await;
        assert!(matches!(
            result,
            Err(CloudPathError::MissingDependencies { .. })
        ));
    }
}
