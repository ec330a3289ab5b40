//! Interval sweeper.
//!
//! A full recursive walk of the monitor root on a fixed period. The sweeper
//! is the completeness half of discovery: the realtime watcher may drop or
//! coalesce notifications under load, so every tick independently re-visits
//! the whole tree and re-emits any file that still matches the predicate.
//! No state is carried between ticks.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::monitor::error::MonitorError;
use crate::monitor::predicate::{FilePredicate, PruneFilter};
use crate::monitor::types::FilePath;
use crate::monitor::watch::{ERROR_CHANNEL_CAPACITY, PATH_CHANNEL_CAPACITY};

/// Walk `root` every `interval` until cancelled, emitting candidate files.
///
/// The first sweep runs immediately so a fresh start does not wait a full
/// period before covering pre-existing stale files.
pub fn find_files_interval(
    root: &Path,
    pred: FilePredicate,
    prune: PruneFilter,
    interval: std::time::Duration,
    token: CancellationToken,
) -> (mpsc::Receiver<FilePath>, mpsc::Receiver<MonitorError>) {
    let (path_tx, path_rx) = mpsc::channel(PATH_CHANNEL_CAPACITY);
    let (err_tx, err_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
    let root = root.to_path_buf();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("sweeper cancelled, stopping");
                    break;
                }
                _ = ticker.tick() => {}
            }

            debug!(root = %root.display(), "starting sweep");
            let walk_root = root.clone();
            let walk_pred = pred.clone();
            let walk_prune = prune.clone();
            let walk_tx = path_tx.clone();
            let walk_token = token.clone();

            let walk = tokio::task::spawn_blocking(move || {
                sweep_once(&walk_root, &walk_pred, &walk_prune, &walk_tx, &walk_token)
            })
            .await;

            match walk {
                Ok(Ok(matched)) => debug!(matched, "sweep complete"),
                Ok(Err(err)) => {
                    // Only root-level access failures reach here; they are
                    // fatal because the sweep can no longer guarantee
                    // completeness.
                    let _ = err_tx.send(err).await;
                    break;
                }
                Err(join_err) => {
                    let _ = err_tx
                        .send(MonitorError::ChannelClosed(format!(
                            "sweep task panicked: {join_err}"
                        )))
                        .await;
                    break;
                }
            }
        }
    });

    (path_rx, err_rx)
}

/// One full walk. Per-subtree errors are logged and the walk continues; a
/// failure to read the root itself aborts the sweep with an error.
fn sweep_once(
    root: &PathBuf,
    pred: &FilePredicate,
    prune: &PruneFilter,
    path_tx: &mpsc::Sender<FilePath>,
    token: &CancellationToken,
) -> Result<u64, MonitorError> {
    let mut matched = 0u64;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && prune.prunes(entry.path())));

    for entry in walker {
        if token.is_cancelled() {
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(MonitorError::RootUnreadable(root.clone()));
                }
                warn!(error = %err, "sweep could not read subtree, continuing");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let fp = FilePath::observe(entry.path());
        if !fp.meta.exists || !pred(&fp) {
            continue;
        }

        matched += 1;
        // blocking_send applies dispatcher back-pressure to the walk itself.
        if path_tx.blocking_send(fp).is_err() {
            break;
        }
    }

    Ok(matched)
}
