//! Lexical POSIX path arithmetic for cloud keys.
//!
//! Cloud paths are always absolute and always use `/` as the separator, no
//! matter what the host OS uses. Nothing in this module touches the local
//! filesystem or the network.

use crate::constants::POSIX_SEPARATOR;
use crate::error::PathError;

/// Split a POSIX path into its components.
///
/// Empty components (from repeated or trailing separators) and `.` are dropped;
/// `..` is kept so callers can decide how to treat it.
///
/// # Arguments
/// * `path` - POSIX-style path
pub fn posix_components(path: &str) -> Vec<&str> {
    path.split(POSIX_SEPARATOR)
        .filter(|c: &&str| !c.is_empty() && *c != ".")
        .collect()
}

/// Resolve `.` and `..` components lexically.
///
/// The result is always absolute. `..` at the root stays at the root.
///
/// # Arguments
/// * `path` - POSIX-style path, absolute or relative
///
/// # Returns
/// Normalized absolute path; `/` when nothing is left.
pub fn resolve_posix(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for name in path.split(POSIX_SEPARATOR) {
        match name {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(name),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Join a segment onto a base path and resolve the result.
///
/// A segment starting with `/` replaces the base entirely, the same way an
/// absolute component does for local paths.
///
/// # Arguments
/// * `base` - Absolute POSIX path
/// * `segment` - Relative or absolute POSIX path to append
pub fn join_posix(base: &str, segment: &str) -> String {
    if segment.starts_with(POSIX_SEPARATOR) {
        resolve_posix(segment)
    } else {
        resolve_posix(&format!("{}/{}", base, segment))
    }
}

/// Parent of a path. The parent of `/` is `/`.
///
/// # Arguments
/// * `path` - POSIX-style path
pub fn parent_posix(path: &str) -> String {
    let resolved: String = resolve_posix(path);
    match resolved.rfind(POSIX_SEPARATOR) {
        Some(0) | None => "/".to_string(),
        Some(idx) => resolved[..idx].to_string(),
    }
}

/// Final component of a path, or `""` for the root.
///
/// # Arguments
/// * `path` - POSIX-style path
pub fn file_name(path: &str) -> &str {
    posix_components(path).last().copied().unwrap_or("")
}

/// Final component without its last suffix.
///
/// # Arguments
/// * `name` - A single path component
///
/// # Example
/// ```
/// use rusty_cloudpath_common::file_stem;
///
/// assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
/// assert_eq!(file_stem(".bashrc"), ".bashrc");
/// ```
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 && i < name.len() - 1 => &name[..i],
        _ => name,
    }
}

/// Last suffix of a component including its dot, or `""`.
///
/// Leading dots (hidden files) and a trailing dot do not start a suffix.
///
/// # Arguments
/// * `name` - A single path component
pub fn file_suffix(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 && i < name.len() - 1 => &name[i..],
        _ => "",
    }
}

/// All suffixes of a component, in order (`.tar`, `.gz`).
///
/// # Arguments
/// * `name` - A single path component
pub fn file_suffixes(name: &str) -> Vec<String> {
    if name.ends_with('.') {
        return Vec::new();
    }
    name.trim_start_matches('.')
        .split('.')
        .skip(1)
        .map(|s: &str| format!(".{}", s))
        .collect()
}

/// Check that a string is usable as a single path component.
///
/// # Arguments
/// * `name` - Candidate component
///
/// # Errors
/// Returns `PathError::InvalidName` for empty names, `.`/`..`, or names
/// containing a separator.
pub fn validate_name(name: &str) -> Result<(), PathError> {
    let reason: Option<&str> = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative reference")
    } else if name.contains(POSIX_SEPARATOR) {
        Some("name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PathError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Whether `path` equals `base` or lies underneath it (lexically).
///
/// # Arguments
/// * `path` - POSIX path to test
/// * `base` - POSIX path it may be under
pub fn is_relative_to(path: &str, base: &str) -> bool {
    relative_posix(path, base).is_ok()
}

/// Express `path` relative to `base`.
///
/// # Arguments
/// * `path` - POSIX path
/// * `base` - POSIX path that must be an ancestor of (or equal to) `path`
///
/// # Returns
/// Relative POSIX path without a leading separator; `""` when equal.
///
/// # Errors
/// Returns `PathError::NotRelative` when `path` is not under `base`.
pub fn relative_posix(path: &str, base: &str) -> Result<String, PathError> {
    let path: String = resolve_posix(path);
    let base: String = resolve_posix(base);

    if path == base {
        return Ok(String::new());
    }
    if base == "/" {
        return Ok(path[1..].to_string());
    }

    let prefix: String = format!("{}/", base);
    match path.strip_prefix(&prefix) {
        Some(rest) => Ok(rest.to_string()),
        None => Err(PathError::NotRelative { path, base }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_components() {
        assert_eq!(posix_components("/a//b/./c/"), vec!["a", "b", "c"]);
        assert_eq!(posix_components("a/../b"), vec!["a", "..", "b"]);
        assert!(posix_components("/").is_empty());
    }

    #[test]
    fn test_resolve_posix() {
        assert_eq!(resolve_posix("/bucket/a/../b"), "/bucket/b");
        assert_eq!(resolve_posix("/bucket/./a/"), "/bucket/a");
        assert_eq!(resolve_posix("/../.."), "/");
        assert_eq!(resolve_posix(""), "/");
        assert_eq!(resolve_posix("bucket/key"), "/bucket/key");
    }

    #[test]
    fn test_join_posix() {
        assert_eq!(join_posix("/bucket/dir", "file.txt"), "/bucket/dir/file.txt");
        assert_eq!(join_posix("/bucket/dir/", "sub/file.txt"), "/bucket/dir/sub/file.txt");
        assert_eq!(join_posix("/bucket/dir", "../other"), "/bucket/other");
        assert_eq!(join_posix("/bucket/dir", "/elsewhere/x"), "/elsewhere/x");
    }

    #[test]
    fn test_parent_posix() {
        assert_eq!(parent_posix("/bucket/dir/file.txt"), "/bucket/dir");
        assert_eq!(parent_posix("/bucket/dir/"), "/bucket");
        assert_eq!(parent_posix("/bucket"), "/");
        assert_eq!(parent_posix("/"), "/");
    }

    #[test]
    fn test_name_stem_suffix() {
        assert_eq!(file_name("/bucket/dir/archive.tar.gz"), "archive.tar.gz");
        assert_eq!(file_name("/bucket/dir/"), "dir");
        assert_eq!(file_name("/"), "");

        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_suffix("archive.tar.gz"), ".gz");
        assert_eq!(file_suffixes("archive.tar.gz"), vec![".tar", ".gz"]);

        assert_eq!(file_suffix(".bashrc"), "");
        assert_eq!(file_stem(".bashrc"), ".bashrc");
        assert!(file_suffixes(".bashrc").is_empty());

        assert_eq!(file_suffix("trailing."), "");
        assert!(file_suffixes("trailing.").is_empty());
        assert_eq!(file_suffix("noext"), "");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("file.txt").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }

    #[test]
    fn test_relative_posix() {
        assert_eq!(relative_posix("/bucket/a/b.txt", "/bucket").unwrap(), "a/b.txt");
        assert_eq!(relative_posix("/bucket/a", "/bucket/a").unwrap(), "");
        assert_eq!(relative_posix("/bucket/a", "/").unwrap(), "bucket/a");
        assert!(relative_posix("/bucket/ab", "/bucket/a").is_err());
        assert!(is_relative_to("/bucket/a/b", "/bucket/a"));
        assert!(!is_relative_to("/other/a", "/bucket"));
    }
}
