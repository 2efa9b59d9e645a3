//! Segment-level pattern compilation.
//!
//! Each `/`-separated segment of a pattern is compiled on its own with
//! `globset`, so `*`, `?`, `[...]`, `[!...]` and `{a,b}` never cross a
//! separator.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::CloudPathError;

/// The recursive wildcard segment.
pub(crate) const RECURSIVE: &str = "**";

/// The parent segment.
pub(crate) const PARENT: &str = "..";

/// Split a pattern into segments, dropping empty and `.` segments.
pub(crate) fn pattern_segments(pattern: &str) -> Vec<&str> {
    pattern
        .split('/')
        .filter(|s: &&str| !s.is_empty() && *s != ".")
        .collect()
}

fn invalid(pattern: &str, message: impl Into<String>) -> CloudPathError {
    CloudPathError::InvalidPattern {
        pattern: pattern.to_string(),
        message: message.into(),
    }
}

/// Compile one segment.
///
/// # Arguments
/// * `segment` - Single pattern segment (no `/`)
/// * `case_sensitive` - Whether names must match case exactly
/// * `pattern` - Whole pattern, for error messages
///
/// # Errors
/// Returns `InvalidPattern` for malformed syntax or a `**` that is not a
/// whole segment.
pub(crate) fn compile_segment(
    segment: &str,
    case_sensitive: bool,
    pattern: &str,
) -> Result<GlobMatcher, CloudPathError> {
    if segment != RECURSIVE && segment.contains(RECURSIVE) {
        return Err(invalid(pattern, "'**' can only be an entire path segment"));
    }

    let glob = GlobBuilder::new(segment)
        .literal_separator(true)
        .case_insensitive(!case_sensitive)
        .backslash_escape(true)
        .build()
        .map_err(|e| invalid(pattern, e.to_string()))?;
    Ok(glob.compile_matcher())
}

/// Compiled form of one segment for whole-path matching.
enum PathSegment {
    Recursive,
    Name(GlobMatcher),
}

fn matches_from(segments: &[PathSegment], components: &[&str]) -> bool {
    match segments.split_first() {
        None => components.is_empty(),
        Some((PathSegment::Recursive, rest)) => {
            (0..=components.len()).any(|skip: usize| matches_from(rest, &components[skip..]))
        }
        Some((PathSegment::Name(matcher), rest)) => match components.split_first() {
            Some((first, remaining)) => matcher.is_match(first) && matches_from(rest, remaining),
            None => false,
        },
    }
}

/// Match path components against a pattern.
///
/// Patterns starting with `/` must match every component; other patterns
/// match the trailing components. `**` matches any number of components.
///
/// # Errors
/// Returns `InvalidPattern` for empty or malformed patterns.
pub(crate) fn match_path(
    components: &[&str],
    pattern: &str,
    case_sensitive: bool,
) -> Result<bool, CloudPathError> {
    let anchored: bool = pattern.starts_with('/');
    let segments: Vec<PathSegment> = pattern_segments(pattern)
        .into_iter()
        .map(|segment: &str| match segment {
            RECURSIVE => Ok(PathSegment::Recursive),
            _ => compile_segment(segment, case_sensitive, pattern).map(PathSegment::Name),
        })
        .collect::<Result<_, _>>()?;

    if segments.is_empty() {
        return Err(invalid(pattern, "empty pattern"));
    }

    if anchored {
        return Ok(matches_from(&segments, components));
    }
    Ok((0..=components.len()).any(|start: usize| matches_from(&segments, &components[start..])))
}
