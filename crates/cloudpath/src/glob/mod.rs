//! Glob evaluation over remote listings.
//!
//! A pattern compiles into a chain of selectors. Evaluation is a depth-first
//! walk driven by an explicit work stack and exposed as a lazy stream: nothing
//! is listed until the consumer polls, and each directory is listed at most
//! once per evaluation. A new `glob` call starts from scratch.

mod pattern;
mod selector;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use rusty_cloudpath_storage::{ListEntry, ObjectLocation};

use crate::error::CloudPathError;
use crate::path::{CloudPath, PathStream};

pub(crate) use pattern::match_path;
use selector::{compile, CompiledPattern, Selector};

/// Lazy sequence of glob matches.
pub type GlobStream = PathStream;

enum Work {
    /// Apply selector `idx` to `key`.
    Select { key: String, idx: usize },
    /// Apply selector `idx` to `key` and to every directory below it.
    Walk { key: String, idx: usize },
}

struct GlobState {
    base: CloudPath,
    pattern: Arc<CompiledPattern>,
    stack: Vec<Work>,
    listings: HashMap<String, Arc<Vec<ListEntry>>>,
    seen: HashSet<String>,
}

fn parent_key(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

impl GlobState {
    async fn list(&mut self, key: &str) -> Result<Arc<Vec<ListEntry>>, CloudPathError> {
        if let Some(entries) = self.listings.get(key) {
            return Ok(Arc::clone(entries));
        }

        let location: ObjectLocation = ObjectLocation::new(self.base.drive(), key);
        let entries: Vec<ListEntry> = self
            .base
            .client()
            .backend()
            .list_children(&location, false)
            .try_collect()
            .await?;
        let entries: Arc<Vec<ListEntry>> = Arc::new(entries);
        self.listings.insert(key.to_string(), Arc::clone(&entries));
        Ok(entries)
    }

    /// Process one unit of work.
    ///
    /// # Returns
    /// The key of a match, if this step produced one.
    async fn step(&mut self, work: Work) -> Result<Option<String>, CloudPathError> {
        let pattern: Arc<CompiledPattern> = Arc::clone(&self.pattern);

        match work {
            Work::Select { key, idx } => match &pattern.selectors[idx] {
                Selector::Terminating => {
                    if pattern.deduplicate && !self.seen.insert(key.clone()) {
                        return Ok(None);
                    }
                    Ok(Some(key))
                }
                Selector::Wildcard { matcher, dir_only } => {
                    let entries: Arc<Vec<ListEntry>> = self.list(&key).await?;
                    // Reversed so the stack pops children in listing order.
                    for entry in entries.iter().rev() {
                        if *dir_only && !entry.is_dir {
                            continue;
                        }
                        if matcher.is_match(entry.location.name()) {
                            self.stack.push(Work::Select {
                                key: entry.location.key.clone(),
                                idx: idx + 1,
                            });
                        }
                    }
                    Ok(None)
                }
                Selector::RecursiveWildcard | Selector::DoubleRecursive => {
                    self.stack.push(Work::Walk { key, idx: idx + 1 });
                    Ok(None)
                }
                Selector::Parent => {
                    self.stack.push(Work::Select {
                        key: parent_key(&key),
                        idx: idx + 1,
                    });
                    Ok(None)
                }
            },
            Work::Walk { key, idx } => {
                let entries: Arc<Vec<ListEntry>> = self.list(&key).await?;
                for entry in entries.iter().rev().filter(|e: &&ListEntry| e.is_dir) {
                    self.stack.push(Work::Walk {
                        key: entry.location.key.clone(),
                        idx,
                    });
                }
                // The directory itself goes before its descendants.
                self.stack.push(Work::Select { key, idx });
                Ok(None)
            }
        }
    }
}

/// Evaluate a relative pattern below `base`.
///
/// # Errors
/// Pattern errors are reported here, before anything is listed. Listing
/// errors come out of the stream.
pub(crate) fn glob_stream(
    base: &CloudPath,
    pattern: &str,
    case_sensitive: bool,
) -> Result<GlobStream, CloudPathError> {
    let compiled: CompiledPattern = compile(pattern, case_sensitive)?;
    log::debug!("Globbing '{}' under {}", pattern, base);

    let state: GlobState = GlobState {
        base: base.clone(),
        pattern: Arc::new(compiled),
        stack: vec![Work::Select {
            key: base.key().to_string(),
            idx: 0,
        }],
        listings: HashMap::new(),
        seen: HashSet::new(),
    };

    let matches = stream::try_unfold(state, |mut state: GlobState| async move {
        while let Some(work) = state.stack.pop() {
            if let Some(key) = state.step(work).await? {
                let path: CloudPath = state.base.with_key(&key);
                return Ok(Some((path, state)));
            }
        }
        Ok::<Option<(CloudPath, GlobState)>, CloudPathError>(None)
    });
    Ok(matches.boxed())
}
