//! Realtime filesystem watcher.
//!
//! A thin wrapper around `notify` that turns create/write/rename
//! notifications under the monitor root into candidate `FilePath`s. Recursive
//! mode means directories created after startup are covered without extra
//! bookkeeping; pruned subtrees are suppressed by re-applying the prune
//! filter to every notified path. Losing the notification backend (overflow,
//! channel teardown) is fatal: silent gaps would defeat the completeness
//! guarantee the sweeper provides.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::monitor::error::MonitorError;
use crate::monitor::predicate::{FilePredicate, PruneFilter};
use crate::monitor::types::FilePath;

/// Capacity of the raw notification channel between the notify backend
/// thread and the watcher task.
const RAW_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the emitted path channel; kept small so dispatcher
/// back-pressure reaches the producer.
pub(crate) const PATH_CHANNEL_CAPACITY: usize = 16;

pub(crate) const ERROR_CHANNEL_CAPACITY: usize = 8;

enum RawMessage {
    Event(Event),
    Error(notify::Error),
}

/// Watch `root` for new or modified candidate files until cancelled.
///
/// Returns the discovery stream and its error stream. Both close when the
/// watcher task exits.
pub fn watch_files(
    root: &Path,
    pred: FilePredicate,
    prune: PruneFilter,
    token: CancellationToken,
) -> (mpsc::Receiver<FilePath>, mpsc::Receiver<MonitorError>) {
    let (path_tx, path_rx) = mpsc::channel(PATH_CHANNEL_CAPACITY);
    let (err_tx, err_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
    let root = root.to_path_buf();

    tokio::spawn(async move {
        if let Err(err) = watch_loop(root, pred, prune, token, path_tx).await {
            let _ = err_tx.send(err).await;
        }
    });

    (path_rx, err_rx)
}

async fn watch_loop(
    root: PathBuf,
    pred: FilePredicate,
    prune: PruneFilter,
    token: CancellationToken,
    path_tx: mpsc::Sender<FilePath>,
) -> Result<(), MonitorError> {
    let (raw_tx, mut raw_rx) = mpsc::channel::<RawMessage>(RAW_CHANNEL_CAPACITY);

    // The notify backend invokes this closure from its own thread.
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            let msg = match res {
                Ok(event) => RawMessage::Event(event),
                Err(err) => RawMessage::Error(err),
            };
            // A send failure means the watcher task has already exited.
            let _ = raw_tx.blocking_send(msg);
        },
        notify::Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    debug!(root = %root.display(), "filesystem watcher started");

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!("watcher cancelled, stopping");
                break;
            }

            msg = raw_rx.recv() => {
                match msg {
                    Some(RawMessage::Event(event)) => {
                        handle_event(event, &pred, &prune, &path_tx, &token).await?;
                    }
                    Some(RawMessage::Error(err)) => {
                        // Backend errors mean notifications may have been
                        // dropped; surface as fatal rather than limp on.
                        return Err(err.into());
                    }
                    None => {
                        if token.is_cancelled() {
                            break;
                        }
                        return Err(MonitorError::ChannelClosed(
                            "filesystem notification channel closed unexpectedly".to_string(),
                        ));
                    }
                }
            }
        }
    }

    // Dropping the watcher removes all OS watch registrations.
    drop(watcher);
    Ok(())
}

async fn handle_event(
    event: Event,
    pred: &FilePredicate,
    prune: &PruneFilter,
    path_tx: &mpsc::Sender<FilePath>,
    token: &CancellationToken,
) -> Result<(), MonitorError> {
    // The backend reports a kernel queue overflow as a rescan-flagged event,
    // not as an error. Notifications were dropped, so completeness is gone.
    if event.need_rescan() {
        warn!("event queue overflow, rescan required");
        return Err(MonitorError::EventOverflow);
    }

    if !is_candidate_kind(&event.kind) {
        return Ok(());
    }

    for path in event_paths(&event) {
        if prune.prunes_path(&path) {
            debug!(path = %path.display(), "event inside pruned subtree, suppressed");
            continue;
        }

        let fp = FilePath::observe(&path);
        if !fp.is_regular_file() || !pred(&fp) {
            continue;
        }

        debug!(path = %fp.path.display(), "watcher matched candidate");
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            sent = path_tx.send(fp) => {
                if sent.is_err() {
                    warn!("discovery consumer gone, watcher stopping emission");
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

fn is_candidate_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Name(_))
    )
}

/// Paths worth evaluating for an event. Rename sequences resolve to the final
/// path: for a `Both` rename only the target half is kept, and a `From`-only
/// half is dropped entirely (the file is no longer at that path; if the
/// matching `To` never arrives, the next sweep covers it).
fn event_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        _ => event.paths.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::predicate::requires_checksum;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn candidate_pred() -> FilePredicate {
        Arc::new(requires_checksum)
    }

    #[test]
    fn rename_both_resolves_to_target() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/data/old.fast5"))
            .add_path(PathBuf::from("/data/new.fast5"));
        assert_eq!(event_paths(&event), vec![PathBuf::from("/data/new.fast5")]);
    }

    #[test]
    fn rename_from_is_dropped() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/data/old.fast5"));
        assert!(event_paths(&event).is_empty());
    }

    #[tokio::test]
    async fn rescan_flagged_event_is_fatal() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let (path_tx, _path_rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let overflow = Event::new(EventKind::Other).set_flag(notify::event::Flag::Rescan);
        let err = handle_event(
            overflow,
            &candidate_pred(),
            &PruneFilter::empty(&root),
            &path_tx,
            &token,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MonitorError::EventOverflow));
    }

    #[test]
    fn remove_events_are_not_candidates() {
        assert!(!is_candidate_kind(&EventKind::Remove(
            notify::event::RemoveKind::File
        )));
        assert!(is_candidate_kind(&EventKind::Create(CreateKind::File)));
    }

    #[tokio::test]
    async fn emits_created_data_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let token = CancellationToken::new();

        let (mut paths, _errs) = watch_files(
            &root,
            candidate_pred(),
            PruneFilter::empty(&root),
            token.clone(),
        );

        // Give the backend a moment to register before writing.
        tokio::time::sleep(Duration::from_millis(250)).await;
        fs::write(root.join("sample.fast5"), b"signal").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), paths.recv())
            .await
            .expect("watcher did not emit in time")
            .expect("path stream closed");
        assert_eq!(got.path.file_name().unwrap(), "sample.fast5");

        token.cancel();
    }

    #[tokio::test]
    async fn suppresses_pruned_subtree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir(root.join("intermediate")).unwrap();
        let token = CancellationToken::new();

        let prune = PruneFilter::new(&root, &["intermediate".to_string()]).unwrap();
        let (mut paths, _errs) = watch_files(&root, candidate_pred(), prune, token.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        fs::write(root.join("intermediate/hidden.fast5"), b"signal").unwrap();
        fs::write(root.join("visible.fast5"), b"signal").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), paths.recv())
            .await
            .expect("watcher did not emit in time")
            .expect("path stream closed");
        assert_eq!(got.path.file_name().unwrap(), "visible.fast5");

        token.cancel();
    }

    #[tokio::test]
    async fn stream_closes_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let token = CancellationToken::new();

        let (mut paths, _errs) = watch_files(
            &root,
            candidate_pred(),
            PruneFilter::empty(&root),
            token.clone(),
        );

        token.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(5), paths.recv())
            .await
            .expect("watcher did not shut down in time");
        assert!(closed.is_none());
    }
}
