use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::{FlushOutcome, SyncCache};

/// Handle to the periodic refresh task. Dropping it leaves the task running;
/// call [`RefresherHandle::shutdown`] to stop it.
#[derive(Debug)]
pub struct RefresherHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Stop after the current tick (if any) completes.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = (&mut self.task).await {
            tracing::error!(error = %err, "refresher task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that refreshes `cache` every `every` and then gives queued
/// edits a chance to upload. The first run happens one interval from now.
///
/// Ticks that come due while a refresh is still in flight are skipped. A tick
/// that panics is logged and does not stop the loop.
pub fn spawn_refresher(cache: Arc<SyncCache>, every: Duration) -> RefresherHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(every_secs = every.as_secs(), "background refresh scheduled");
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {}
            }
            if cache.is_refreshing() {
                tracing::debug!("refresh already in flight; skipping tick");
                continue;
            }
            let cache = Arc::clone(&cache);
            if let Err(err) = tokio::spawn(async move { tick(&cache).await }).await {
                tracing::error!(error = %err, "background refresh failed");
            }
        }
        tracing::info!("background refresh stopped");
    });
    RefresherHandle {
        stop: Some(stop_tx),
        task,
    }
}

async fn tick(cache: &SyncCache) {
    let snapshot = cache.get_snapshot(false).await;
    tracing::debug!(source = ?snapshot.source, fetched_at = %snapshot.fetched_at, "background refresh tick");
    match cache.flush_pending().await {
        FlushOutcome::NothingToFlush => {}
        FlushOutcome::Flushed { edits } => tracing::info!(edits, "flushed queued edits"),
        FlushOutcome::Deferred(reason) => tracing::warn!(?reason, "queued edits not flushed"),
    }
}
