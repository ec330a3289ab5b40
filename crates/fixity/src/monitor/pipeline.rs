//! Pipeline wiring.
//!
//! root -> {watcher, sweeper} -> merger -> dispatcher -> work function.
//!
//! A single cancellation token is shared by every stage. It is cancelled by
//! the caller (on SIGINT/SIGTERM), by the first fatal discovery error, or by
//! the first work failure; each long-lived task selects on it alongside its
//! normal input and exits promptly.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::monitor::checksum::{ChecksumWork, DryRunWork, WorkFunc};
use crate::monitor::config::MonitorConfig;
use crate::monitor::error::{MonitorError, Result};
use crate::monitor::predicate::{requires_checksum, FilePredicate, PruneFilter};
use crate::monitor::watch::{ERROR_CHANNEL_CAPACITY, PATH_CHANNEL_CAPACITY};
use crate::monitor::{dispatch, merge, sweep, watch};

/// Run the monitor until the token is cancelled or a fatal error occurs.
///
/// Exactly one fatal error, if any, is returned; a cancellation-driven
/// shutdown with no error returns `Ok(())`.
pub async fn run(config: &MonitorConfig, token: CancellationToken) -> Result<()> {
    config.validate()?;

    let prune = PruneFilter::new(&config.root, &config.exclude)?;
    let pred: FilePredicate = Arc::new(requires_checksum);
    let work: Arc<dyn WorkFunc> = if config.dry_run {
        info!("dry-run mode: no sidecars will be written");
        Arc::new(DryRunWork)
    } else {
        Arc::new(ChecksumWork)
    };

    info!(
        root = %config.root.display(),
        interval = %humantime::format_duration(config.interval),
        max_proc = config.max_proc,
        "monitor starting"
    );

    let (watch_paths, watch_errs) = watch::watch_files(
        &config.root,
        Arc::clone(&pred),
        prune.clone(),
        token.clone(),
    );
    let (sweep_paths, sweep_errs) = sweep::find_files_interval(
        &config.root,
        pred,
        prune,
        config.interval,
        token.clone(),
    );

    let paths = merge::merge(vec![watch_paths, sweep_paths], PATH_CHANNEL_CAPACITY);
    let mut errs = merge::merge(vec![watch_errs, sweep_errs], ERROR_CHANNEL_CAPACITY);

    // The first discovery error cancels the whole pipeline and is retained
    // as the run's fatal error unless the dispatcher failed first.
    let err_token = token.clone();
    let err_monitor = tokio::spawn(async move {
        let first = errs.recv().await;
        if let Some(ref err) = first {
            error!(error = %err, "discovery error, cancelling pipeline");
            err_token.cancel();
        }
        first
    });

    let dispatch_result =
        dispatch::process_files(paths, work, config.max_proc, token.clone()).await;

    // The dispatcher has exited; make sure the producers (and with them the
    // error channel) wind down so the monitor task completes.
    token.cancel();
    let discovery_error: Option<MonitorError> = err_monitor.await.ok().flatten();

    dispatch_result?;
    if let Some(err) = discovery_error {
        return Err(err);
    }

    info!("monitor stopped cleanly");
    Ok(())
}
