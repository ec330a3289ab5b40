//! Checksum subcommands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fixity::monitor::{self, config::default_max_proc, MonitorConfig, DEFAULT_SWEEP_INTERVAL};

/// Arguments for `fixity checksum create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// The root directory of the monitor
    #[arg(short = 'r', long)]
    pub root: PathBuf,

    /// Patterns matching directories to prune from both monitoring and
    /// interval sweeps (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Directory sweep interval, minimum 30s (e.g. 30s, 20m, 1h)
    #[arg(short = 'i', long, value_parser = humantime::parse_duration,
          default_value = DEFAULT_INTERVAL_ARG)]
    pub interval: Duration,

    /// Maximum number of concurrent checksum workers
    #[arg(short = 'm', long = "max-proc", default_value_t = default_max_proc())]
    pub max_proc: usize,

    /// Dry-run (make no changes)
    #[arg(long)]
    pub dry_run: bool,
}

/// Rendered form of `DEFAULT_SWEEP_INTERVAL`; kept in sync by test.
const DEFAULT_INTERVAL_ARG: &str = "10m";

/// Execute `checksum create`: monitor the root until interrupted.
pub async fn run_create(args: CreateArgs, token: CancellationToken) -> Result<()> {
    let config = MonitorConfig {
        root: args.root,
        exclude: args.exclude,
        interval: args.interval,
        max_proc: args.max_proc,
        dry_run: args.dry_run,
    };

    monitor::run(&config, token)
        .await
        .context("failed processing")?;

    info!("shutdown complete");
    Ok(())
}
