//! Bounded-concurrency work dispatcher.
//!
//! Consumes the merged discovery stream and runs the work function on each
//! path under a semaphore budget of `max_proc` permits. Admission control is
//! acquire-before-spawn: when every permit is held the dispatcher blocks,
//! which back-pressures the merger and, through it, both discovery sources.
//!
//! The first work failure cancels the shared token immediately (the failing
//! worker does this itself, so no new work is admitted while the result is
//! still in flight) and becomes the pipeline's single fatal error. Workers
//! already running are allowed to finish their current file to keep sidecar
//! writes atomic.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::monitor::checksum::WorkFunc;
use crate::monitor::error::{MonitorError, Result};
use crate::monitor::types::{FilePath, WorkOutcome};

/// Drain the merged path stream through a pool of at most `max_proc`
/// concurrent workers. Returns the first fatal work error, if any.
pub async fn process_files(
    mut paths: mpsc::Receiver<FilePath>,
    work: Arc<dyn WorkFunc>,
    max_proc: usize,
    token: CancellationToken,
) -> Result<()> {
    let budget = Arc::new(Semaphore::new(max_proc.max(1)));
    let mut workers: JoinSet<(FilePath, WorkOutcome)> = JoinSet::new();
    let mut first_error: Option<MonitorError> = None;

    loop {
        let fp = tokio::select! {
            biased;

            _ = token.cancelled() => break,
            maybe = paths.recv() => {
                match maybe {
                    Some(fp) => fp,
                    None => break,
                }
            }
        };

        // Admission control: wait for a free slot before spawning. Permits
        // are released by the workers themselves, so this cannot deadlock on
        // outcome collection.
        let permit = tokio::select! {
            biased;

            _ = token.cancelled() => break,
            acquired = budget.clone().acquire_owned() => {
                match acquired {
                    Ok(permit) => permit,
                    Err(_) => break,
                }
            }
        };

        debug!(path = %fp.path.display(), "dispatching work");
        let work = Arc::clone(&work);
        let worker_token = token.clone();
        workers.spawn(async move {
            let outcome = work.run(&fp).await;
            if outcome.is_failure() {
                // Fail fast: stop admission before the outcome is collected.
                worker_token.cancel();
            }
            drop(permit);
            (fp, outcome)
        });

        collect_finished(&mut workers, &mut first_error);
    }

    // Stream closed or cancellation observed: let in-flight work finish.
    while let Some(joined) = workers.join_next().await {
        record_outcome(joined, &mut first_error);
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Reap workers that have already finished, without blocking.
fn collect_finished(
    workers: &mut JoinSet<(FilePath, WorkOutcome)>,
    first_error: &mut Option<MonitorError>,
) {
    while let Some(joined) = workers.try_join_next() {
        record_outcome(joined, first_error);
    }
}

fn record_outcome(
    joined: std::result::Result<(FilePath, WorkOutcome), tokio::task::JoinError>,
    first_error: &mut Option<MonitorError>,
) {
    match joined {
        Ok((fp, WorkOutcome::Success)) => {
            debug!(path = %fp.path.display(), "work succeeded");
        }
        Ok((fp, WorkOutcome::Skipped)) => {
            debug!(path = %fp.path.display(), "work skipped");
        }
        Ok((fp, WorkOutcome::Failed(err))) => {
            error!(path = %fp.path.display(), error = %err, "work failed");
            if first_error.is_none() {
                *first_error = Some(err);
            }
        }
        Err(join_err) => {
            error!(error = %join_err, "worker task failed to join");
            if first_error.is_none() {
                *first_error = Some(MonitorError::ChannelClosed(format!(
                    "worker task panicked: {join_err}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::monitor::types::FileMeta;

    fn fake_path(name: &str) -> FilePath {
        FilePath {
            path: PathBuf::from(format!("/data/{name}")),
            meta: FileMeta {
                size: 1,
                mtime: None,
                exists: true,
            },
        }
    }

    /// Records the maximum number of concurrently running invocations.
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
        total: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WorkFunc for ConcurrencyProbe {
        async fn run(&self, _fp: &FilePath) -> WorkOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.total.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            WorkOutcome::Success
        }
    }

    /// Fails on the first path, succeeds afterwards.
    struct FailFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkFunc for FailFirst {
        async fn run(&self, fp: &FilePath) -> WorkOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                WorkOutcome::Failed(MonitorError::SourceRemoved(fp.path.clone()))
            } else {
                WorkOutcome::Success
            }
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_budget() {
        let (tx, rx) = mpsc::channel(64);
        let probe = Arc::new(ConcurrencyProbe::new());
        let token = CancellationToken::new();

        for i in 0..20 {
            tx.send(fake_path(&format!("f{i}.fast5"))).await.unwrap();
        }
        drop(tx);

        process_files(rx, probe.clone(), 3, token).await.unwrap();

        assert_eq!(probe.total.load(Ordering::SeqCst), 20);
        assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn serial_budget_processes_everything() {
        let (tx, rx) = mpsc::channel(8);
        let probe = Arc::new(ConcurrencyProbe::new());
        let token = CancellationToken::new();

        for i in 0..5 {
            tx.send(fake_path(&format!("f{i}.fast5"))).await.unwrap();
        }
        drop(tx);

        process_files(rx, probe.clone(), 1, token).await.unwrap();
        assert_eq!(probe.total.load(Ordering::SeqCst), 5);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_failure_stops_dispatch_and_is_reported() {
        let (tx, rx) = mpsc::channel(64);
        let work = Arc::new(FailFirst {
            calls: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();

        for i in 0..50 {
            tx.send(fake_path(&format!("f{i}.fast5"))).await.unwrap();
        }
        drop(tx);

        let err = process_files(rx, work.clone(), 1, token.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::SourceRemoved(_)));
        assert!(token.is_cancelled());

        // With a serial budget the failing call cancels the token before the
        // next admission, so nothing else ran.
        assert_eq!(work.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_admission_but_drains_in_flight() {
        let (tx, rx) = mpsc::channel(64);
        let probe = Arc::new(ConcurrencyProbe::new());
        let token = CancellationToken::new();

        tx.send(fake_path("f0.fast5")).await.unwrap();
        let pipeline = tokio::spawn(process_files(rx, probe.clone(), 2, token.clone()));

        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
        // Sender kept open: only cancellation can end the dispatcher.
        pipeline.await.unwrap().unwrap();

        assert_eq!(probe.current.load(Ordering::SeqCst), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn clean_close_reports_success() {
        let (tx, rx) = mpsc::channel(8);
        drop(tx);
        let probe = Arc::new(ConcurrencyProbe::new());
        let token = CancellationToken::new();

        assert!(process_files(rx, probe, 4, token).await.is_ok());
    }
}
