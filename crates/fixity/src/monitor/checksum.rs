//! Checksum sidecar creation.
//!
//! The work function re-derives the data-file/sidecar relationship on every
//! attempt rather than trusting the discovery-time decision: the watcher and
//! the sweeper may both hand it the same path, and another attempt may have
//! refreshed the sidecar in the meantime. Work is therefore idempotent under
//! concurrent duplicate dispatch.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use filetime::FileTime;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::monitor::error::{MonitorError, Result};
use crate::monitor::types::{FilePath, WorkOutcome};

/// Suffix appended to the data-file path to form the sidecar path.
pub const SIDECAR_SUFFIX: &str = "md5";

const READ_BUF_SIZE: usize = 64 * 1024;

/// The relationship between a data file and its checksum sidecar, derived
/// fresh from the filesystem. Never cached across work attempts.
#[derive(Debug, Clone)]
pub struct ChecksumRecord {
    pub data_path: PathBuf,
    pub sidecar_path: PathBuf,
    /// Digest stored in the sidecar, when one exists and parses.
    pub digest: Option<String>,
    /// Stale iff the sidecar is absent or older than the data file.
    pub stale: bool,
    data_mtime: SystemTime,
}

impl ChecksumRecord {
    /// Derive the current record for `data_path`. Fails with `SourceRemoved`
    /// when the data file no longer exists.
    pub fn derive(data_path: &Path) -> Result<Self> {
        let data_md = match fs::metadata(data_path) {
            Ok(md) => md,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(MonitorError::SourceRemoved(data_path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        let data_mtime = data_md.modified()?;

        let sidecar_path = sidecar_path_for(data_path);
        let (digest, stale) = match fs::metadata(&sidecar_path) {
            Ok(sidecar_md) => {
                let sidecar_mtime = sidecar_md.modified()?;
                let digest = read_sidecar_digest(&sidecar_path);
                (digest, sidecar_mtime < data_mtime)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => (None, true),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            data_path: data_path.to_path_buf(),
            sidecar_path,
            digest,
            stale,
            data_mtime,
        })
    }
}

/// Derive the sidecar path for a data file: `<path>.md5`.
pub fn sidecar_path_for(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

fn read_sidecar_digest(sidecar_path: &Path) -> Option<String> {
    let contents = fs::read_to_string(sidecar_path).ok()?;
    let digest = contents.split_whitespace().next()?;
    if digest.is_empty() {
        None
    } else {
        Some(digest.to_string())
    }
}

/// A unit of checksum work dispatched by the worker pool.
#[async_trait]
pub trait WorkFunc: Send + Sync {
    async fn run(&self, fp: &FilePath) -> WorkOutcome;
}

/// Creates or refreshes the `.md5` sidecar for a data file.
pub struct ChecksumWork;

#[async_trait]
impl WorkFunc for ChecksumWork {
    async fn run(&self, fp: &FilePath) -> WorkOutcome {
        let path = fp.path.clone();
        let result = tokio::task::spawn_blocking(move || create_or_update_sidecar(&path)).await;

        match result {
            Ok(outcome) => outcome,
            Err(join_err) => WorkOutcome::Failed(MonitorError::Digest {
                path: fp.path.clone(),
                message: format!("checksum task panicked: {join_err}"),
            }),
        }
    }
}

/// Dry-run variant: re-checks staleness and logs intent, never writes.
pub struct DryRunWork;

#[async_trait]
impl WorkFunc for DryRunWork {
    async fn run(&self, fp: &FilePath) -> WorkOutcome {
        match ChecksumRecord::derive(&fp.path) {
            Ok(record) if record.stale => {
                info!(
                    path = %record.data_path.display(),
                    sidecar = %record.sidecar_path.display(),
                    "dry-run: would write checksum sidecar"
                );
                WorkOutcome::Success
            }
            Ok(record) => {
                debug!(path = %record.data_path.display(), "dry-run: sidecar already fresh");
                WorkOutcome::Skipped
            }
            Err(MonitorError::SourceRemoved(path)) => {
                debug!(path = %path.display(), "dry-run: file removed before re-check");
                WorkOutcome::Skipped
            }
            Err(err) => WorkOutcome::Failed(err),
        }
    }
}

/// Synchronous body of `ChecksumWork`, run on the blocking pool.
fn create_or_update_sidecar(data_path: &Path) -> WorkOutcome {
    let record = match ChecksumRecord::derive(data_path) {
        Ok(record) => record,
        Err(err) => return WorkOutcome::Failed(err),
    };

    if !record.stale {
        debug!(path = %data_path.display(), "sidecar already fresh, skipping");
        return WorkOutcome::Skipped;
    }

    let digest = match md5_hex(data_path) {
        Ok(digest) => digest,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return WorkOutcome::Failed(MonitorError::SourceRemoved(data_path.to_path_buf()));
        }
        Err(err) => {
            return WorkOutcome::Failed(MonitorError::Work {
                path: data_path.to_path_buf(),
                source: err,
            });
        }
    };

    if let Err(err) = write_sidecar(&record, &digest) {
        return WorkOutcome::Failed(MonitorError::Work {
            path: record.sidecar_path.clone(),
            source: err,
        });
    }

    info!(
        path = %record.data_path.display(),
        sidecar = %record.sidecar_path.display(),
        digest = %digest,
        "wrote checksum sidecar"
    );
    WorkOutcome::Success
}

/// MD5 of the file contents as a lowercase hex string.
pub fn md5_hex(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Write the sidecar atomically: write to a temp file in the same directory,
/// then rename into place, so a reader never observes a partial line. The
/// sidecar mtime is then pinned at or after the data file's mtime so a later
/// sweep does not re-flag it stale.
fn write_sidecar(record: &ChecksumRecord, digest: &str) -> io::Result<()> {
    let dir = record
        .sidecar_path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "sidecar path has no parent"))?;
    let basename = record
        .data_path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "data path has no file name"))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    writeln!(tmp, "{}  {}", digest, basename.to_string_lossy())?;
    tmp.flush()?;
    tmp.persist(&record.sidecar_path)
        .map_err(|persist_err| persist_err.error)?;

    let pinned = record.data_mtime.max(SystemTime::now());
    filetime::set_file_mtime(&record.sidecar_path, FileTime::from_system_time(pinned))?;

    Ok(())
}
