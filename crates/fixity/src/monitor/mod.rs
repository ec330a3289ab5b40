//! Monitor - File Discovery & Checksum Maintenance
//!
//! The monitor discovers candidate data files from two sources (a realtime
//! filesystem watcher and an interval sweeper), merges the streams, and feeds
//! matched paths into a bounded pool of checksum workers. A single shared
//! cancellation token coordinates shutdown across every stage.

pub mod checksum;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod predicate;
pub mod sweep;
pub mod types;
pub mod watch;

// Re-exports for CLI usage
pub use checksum::{ChecksumRecord, ChecksumWork, DryRunWork, WorkFunc};
pub use config::{MonitorConfig, DEFAULT_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL};
pub use error::{MonitorError, Result};
pub use pipeline::run;
pub use predicate::{requires_checksum, FilePredicate, PruneFilter};
pub use types::{FileMeta, FilePath, WorkOutcome};
