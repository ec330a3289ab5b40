//! Core data types flowing through the monitor pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::monitor::error::MonitorError;

/// Metadata captured at the moment a file was observed by a discovery source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub mtime: Option<SystemTime>,
    /// Whether the file existed when it was observed. Discovery races mean a
    /// path can vanish between observation and processing.
    pub exists: bool,
}

impl FileMeta {
    fn missing() -> Self {
        Self {
            size: 0,
            mtime: None,
            exists: false,
        }
    }
}

/// An absolute path plus its observation-time metadata.
///
/// Produced by a discovery source and handed off through the merger to the
/// dispatcher; no stage retains it after passing it downstream.
#[derive(Debug, Clone)]
pub struct FilePath {
    pub path: PathBuf,
    pub meta: FileMeta,
}

impl FilePath {
    /// Stat `path` and capture its metadata. A missing file still yields a
    /// `FilePath` (with `exists = false`) so downstream stages can decide how
    /// to treat the race.
    pub fn observe(path: &Path) -> Self {
        let meta = match fs::metadata(path) {
            Ok(md) => FileMeta {
                size: md.len(),
                mtime: md.modified().ok(),
                exists: true,
            },
            Err(_) => FileMeta::missing(),
        };

        Self {
            path: path.to_path_buf(),
            meta,
        }
    }

    pub fn is_regular_file(&self) -> bool {
        self.meta.exists && self.path.is_file()
    }
}

/// Result of one unit of checksum work.
#[derive(Debug)]
pub enum WorkOutcome {
    /// Sidecar was created or refreshed.
    Success,
    /// Sidecar turned out to be fresh when work started; nothing was written.
    Skipped,
    /// Fatal failure; terminates the pipeline.
    Failed(MonitorError),
}

impl WorkOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, WorkOutcome::Failed(_))
    }
}
