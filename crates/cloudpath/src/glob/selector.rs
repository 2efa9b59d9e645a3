//! Pattern compilation into selectors.

use globset::GlobMatcher;

use super::pattern::{compile_segment, pattern_segments, PARENT, RECURSIVE};
use crate::error::CloudPathError;
use rusty_cloudpath_common::SCHEME_SEPARATOR;

/// One compiled pattern segment.
#[derive(Debug, Clone)]
pub(crate) enum Selector {
    /// End of the pattern: the current path is a match.
    Terminating,
    /// Children of the current path whose name matches. Segments followed by
    /// more segments, or by a trailing `/`, only select directories.
    Wildcard { matcher: GlobMatcher, dir_only: bool },
    /// The current path and every directory below it.
    RecursiveWildcard,
    /// Like `RecursiveWildcard`, in a pattern with more than one `**`.
    /// Results of such patterns are deduplicated.
    DoubleRecursive,
    /// The parent of the current path.
    Parent,
}

/// A pattern ready for evaluation.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    pub(crate) selectors: Vec<Selector>,
    pub(crate) deduplicate: bool,
}

fn not_implemented(message: String) -> CloudPathError {
    CloudPathError::NotImplemented { message }
}

/// Compile a relative glob pattern.
///
/// # Errors
/// * `NotImplemented` - absolute patterns, patterns with a scheme, and
///   patterns mixing `..` with `**`
/// * `InvalidPattern` - empty or malformed patterns
pub(crate) fn compile(pattern: &str, case_sensitive: bool) -> Result<CompiledPattern, CloudPathError> {
    if pattern.starts_with('/') || pattern.contains(SCHEME_SEPARATOR) {
        return Err(not_implemented(format!(
            "non-relative glob pattern '{}' is not supported",
            pattern
        )));
    }

    let mut segments: Vec<&str> = pattern_segments(pattern);
    if segments.is_empty() {
        return Err(CloudPathError::InvalidPattern {
            pattern: pattern.to_string(),
            message: "empty pattern".into(),
        });
    }
    if segments.contains(&PARENT) && segments.contains(&RECURSIVE) {
        return Err(not_implemented(format!(
            "glob pattern '{}' combines '..' with '**'",
            pattern
        )));
    }

    // "a/**/**/b" means the same as "a/**/b".
    segments.dedup_by(|next: &mut &str, prev: &mut &str| *next == RECURSIVE && *prev == RECURSIVE);
    let recursive_count: usize = segments.iter().filter(|s| **s == RECURSIVE).count();
    let deduplicate: bool = recursive_count > 1;

    let last: usize = segments.len() - 1;
    // "a/*/" only matches directories.
    let trailing_slash: bool = pattern.ends_with('/');
    let mut selectors: Vec<Selector> = Vec::with_capacity(segments.len() + 1);
    for (i, segment) in segments.iter().enumerate() {
        let selector: Selector = match *segment {
            RECURSIVE if deduplicate => Selector::DoubleRecursive,
            RECURSIVE => Selector::RecursiveWildcard,
            PARENT => Selector::Parent,
            _ => Selector::Wildcard {
                matcher: compile_segment(segment, case_sensitive, pattern)?,
                dir_only: i != last || trailing_slash,
            },
        };
        selectors.push(selector);
    }
    selectors.push(Selector::Terminating);

    Ok(CompiledPattern {
        selectors,
        deduplicate,
    })
}
