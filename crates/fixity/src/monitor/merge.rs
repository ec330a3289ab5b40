//! Stream fan-in.
//!
//! Merges the discovery streams (and error streams) of the watcher and the
//! sweeper into single channels. Arrival order is preserved within each
//! source only. The merged channel closes once every input has closed, which
//! happens when cancellation has propagated and every producer has exited.
//! Provenance is deliberately discarded: downstream stages never know which
//! source found a path.

use tokio::sync::mpsc;

/// Fan N receivers into one. The output closes when all inputs close.
pub fn merge<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>, capacity: usize) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(capacity);

    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}
