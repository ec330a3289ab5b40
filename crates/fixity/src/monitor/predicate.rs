//! Candidate predicates and directory pruning.
//!
//! Both are pure functions over filesystem state: the predicate decides
//! whether a file needs checksum work, the prune filter decides whether an
//! entire directory subtree is skipped by both discovery sources. Either may
//! be called concurrently from any task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::monitor::checksum::ChecksumRecord;
use crate::monitor::error::Result;
use crate::monitor::types::FilePath;

/// File extensions recognized as instrument data files.
pub const DATA_FILE_EXTENSIONS: &[&str] = &["fast5", "fastq"];

/// Shared, thread-safe candidate predicate.
pub type FilePredicate = Arc<dyn Fn(&FilePath) -> bool + Send + Sync>;

/// Directory exclusion filter compiled from glob patterns.
///
/// Patterns are matched against the absolute directory path; relative
/// patterns are anchored at the monitor root before compilation.
#[derive(Debug, Clone)]
pub struct PruneFilter {
    globs: GlobSet,
    root: PathBuf,
}

impl PruneFilter {
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for raw in patterns {
            let anchored = anchor_pattern(root, raw);
            builder.add(Glob::new(&anchored)?);
        }

        Ok(Self {
            globs: builder.build()?,
            root: root.to_path_buf(),
        })
    }

    /// An empty filter that never prunes.
    pub fn empty(root: &Path) -> Self {
        Self {
            globs: GlobSet::empty(),
            root: root.to_path_buf(),
        }
    }

    /// Whether `dir` itself matches an exclusion pattern.
    pub fn prunes(&self, dir: &Path) -> bool {
        self.globs.is_match(dir)
    }

    /// Whether `path` lies inside any pruned directory. Used by the watcher,
    /// which receives leaf paths rather than walking the tree.
    pub fn prunes_path(&self, path: &Path) -> bool {
        let mut current = path;
        while let Some(parent) = current.parent() {
            if self.prunes(current) {
                return true;
            }
            if current == self.root {
                break;
            }
            current = parent;
        }
        false
    }
}

fn anchor_pattern(root: &Path, raw: &str) -> String {
    let trimmed = raw.trim();
    if Path::new(trimmed).is_absolute() {
        trimmed.to_string()
    } else {
        root.join(trimmed).to_string_lossy().into_owned()
    }
}

fn has_data_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DATA_FILE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// The built-in candidate predicate: a data file whose `.md5` sidecar is
/// missing or older than the file itself.
pub fn requires_checksum(fp: &FilePath) -> bool {
    if !fp.meta.exists || !has_data_extension(&fp.path) {
        return false;
    }

    match ChecksumRecord::derive(&fp.path) {
        Ok(record) => record.stale,
        // The file vanished or could not be read; the next sweep re-checks.
        Err(_) => false,
    }
}
