//! Monitor configuration, constructed once at startup and passed into each
//! pipeline component. No component reads ambient global state.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::error::{MonitorError, Result};

/// Smallest permitted sweep interval; bounds the cost of full-tree walks.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default sweep interval when none is given on the command line.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Configuration for a monitor run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Root directory of the monitor. Must exist and be a readable directory.
    pub root: PathBuf,
    /// Glob patterns matching directories to prune from both discovery
    /// sources. Relative patterns are anchored at `root`.
    pub exclude: Vec<String>,
    /// Full-tree sweep period. Validated against `MIN_SWEEP_INTERVAL`.
    pub interval: Duration,
    /// Maximum number of concurrent checksum workers.
    pub max_proc: usize,
    /// Re-check staleness and log intent without writing anything.
    pub dry_run: bool,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.root.exists() {
            return Err(MonitorError::Config(format!(
                "root directory does not exist: {}",
                self.root.display()
            )));
        }
        if !self.root.is_dir() {
            return Err(MonitorError::Config(format!(
                "root is not a directory: {}",
                self.root.display()
            )));
        }
        if fs::read_dir(&self.root).is_err() {
            return Err(MonitorError::RootUnreadable(self.root.clone()));
        }
        if self.interval < MIN_SWEEP_INTERVAL {
            return Err(MonitorError::Config(format!(
                "sweep interval {} is below the minimum {}",
                humantime::format_duration(self.interval),
                humantime::format_duration(MIN_SWEEP_INTERVAL),
            )));
        }
        if self.max_proc == 0 {
            return Err(MonitorError::Config(
                "max-proc must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Host parallelism, used as the default worker budget.
pub fn default_max_proc() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
