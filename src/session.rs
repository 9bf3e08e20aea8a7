use std::future::Future;

use tokio::sync::mpsc::Receiver;
use tracing::info;

use crate::watcher::event::WatchEvent;
use crate::watcher::merge_events;

/// Wait for the next burst, then merge every burst already queued behind it.
///
/// Empty bursts are skipped. Returns `None` once the channel is closed and empty.
pub async fn next_batch(rx: &mut Receiver<Vec<WatchEvent>>) -> Option<Vec<WatchEvent>> {
    let mut batch = rx.recv().await?;
    while batch.is_empty() {
        batch = rx.recv().await?;
    }
    while let Ok(more) = rx.try_recv() {
        merge_events(&mut batch, more);
    }
    Some(batch)
}

/// Drive the watch loop until `shutdown` resolves or the watcher goes away.
///
/// Runs `on_batch` once per batch and awaits it before looking at the channel
/// again, so runs never overlap. Events that arrive during a run stay queued
/// and are coalesced into the next batch. Returns the number of runs.
pub async fn run_session<S, F, Fut>(
    mut rx: Receiver<Vec<WatchEvent>>,
    shutdown: S,
    mut on_batch: F,
) -> anyhow::Result<usize>
where
    S: Future<Output = ()>,
    F: FnMut(Vec<WatchEvent>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut runs = 0;

    loop {
        let batch = tokio::select! {
            _ = &mut shutdown => {
                info!("stopping");
                break;
            }
            batch = next_batch(&mut rx) => batch,
        };
        let Some(batch) = batch else {
            break;
        };

        info!(
            changes = batch.len(),
            path = %batch[0].path().display(),
            "change detected, running tests"
        );
        on_batch(batch).await?;
        runs += 1;
    }

    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::sync::mpsc;

    fn modified(path: &str) -> WatchEvent {
        WatchEvent::Modified(PathBuf::from(path))
    }

    #[tokio::test]
    async fn test_next_batch_merges_queued_bursts() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(vec![modified("src/a.clj"), modified("src/b.clj")])
            .await
            .unwrap();
        tx.send(vec![]).await.unwrap();
        tx.send(vec![
            WatchEvent::Deleted(PathBuf::from("test/a_test.clj")),
            modified("src/a.clj"),
        ])
        .await
        .unwrap();

        let batch = next_batch(&mut rx).await.unwrap();
        assert_eq!(
            batch,
            vec![
                modified("src/b.clj"),
                WatchEvent::Deleted(PathBuf::from("test/a_test.clj")),
                modified("src/a.clj"),
            ]
        );

        drop(tx);
        assert!(next_batch(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_next_batch_skips_empty_bursts() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(vec![]).await.unwrap();
        drop(tx);
        assert!(next_batch(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_one_burst_triggers_one_run() {
        let (tx, rx) = mpsc::channel(8);
        let burst: Vec<WatchEvent> = (0..40).map(|i| modified(&format!("src/f{i}.clj"))).collect();
        tx.send(burst.clone()).await.unwrap();
        drop(tx);

        let mut batches = Vec::new();
        let runs = run_session(rx, std::future::pending::<()>(), |batch| {
            batches.push(batch);
            async { Ok::<_, anyhow::Error>(()) }
        })
        .await
        .unwrap();

        assert_eq!(runs, 1);
        assert_eq!(batches, vec![burst]);
    }

    #[tokio::test]
    async fn test_bursts_during_a_run_coalesce_into_one_follow_up_run() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(vec![modified("src/core.clj")]).await.unwrap();

        // The first run simulates edits landing while tests are executing.
        let mut pending_sender = Some(tx);
        let mut sizes = Vec::new();
        let runs = run_session(rx, std::future::pending::<()>(), |batch| {
            sizes.push(batch.len());
            if let Some(tx) = pending_sender.take() {
                tx.try_send(vec![modified("src/core.clj")]).unwrap();
                tx.try_send(vec![modified("test/core_test.clj"), modified("src/util.clj")])
                    .unwrap();
            }
            async { Ok::<_, anyhow::Error>(()) }
        })
        .await
        .unwrap();

        assert_eq!(runs, 2, "one run for the trigger, one coalesced run");
        assert_eq!(sizes, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_waiting() {
        let (_tx, rx) = mpsc::channel::<Vec<WatchEvent>>(8);
        let runs = run_session(rx, async {}, |_| async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();
        assert_eq!(runs, 0);
    }

    #[tokio::test]
    async fn test_run_error_ends_session() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(vec![modified("src/core.clj")]).await.unwrap();
        let result = run_session(rx, std::future::pending::<()>(), |_| async {
            Err::<(), _>(anyhow::anyhow!("stdout closed"))
        })
        .await;
        assert!(result.is_err());
    }
}
