mod common;

use std::sync::Arc;
use std::time::Duration;

use kpi_sync::{spawn_refresher, EditPayload, InMemoryRemoteStore, Month, PendingEdit, RemoteError, SyncConfig};

use common::{achieved, config, kpi_table, open_cache};

const EVERY: Duration = Duration::from_secs(900);

#[tokio::test(start_paused = true)]
async fn refreshes_once_per_interval() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let remote = Arc::new(InMemoryRemoteStore::new(kpi_table("85")));
    let cache = open_cache(&remote, &config(tmp.path()));

    let handle = spawn_refresher(Arc::clone(&cache), EVERY);
    tokio::time::sleep(Duration::from_secs(899)).await;
    assert_eq!(remote.fetch_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(remote.fetch_count(), 1);
    assert!(cache.published().is_some());

    tokio::time::sleep(EVERY).await;
    assert_eq!(remote.fetch_count(), 2);

    handle.shutdown().await;
    tokio::time::sleep(EVERY * 3).await;
    assert_eq!(remote.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn tick_is_skipped_while_another_refresh_is_running() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let remote = Arc::new(InMemoryRemoteStore::new(kpi_table("85")));
    remote.set_fetch_delay(Duration::from_secs(1_000));
    let cache = open_cache(
        &remote,
        &SyncConfig {
            remote_timeout_secs: 3_600,
            ..config(tmp.path())
        },
    );

    let handle = spawn_refresher(Arc::clone(&cache), EVERY);
    let manual = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.force_refresh().await })
    };

    tokio::time::sleep(Duration::from_secs(950)).await;
    assert!(cache.is_refreshing());
    assert_eq!(remote.fetch_count(), 1);

    manual.await.expect("manual refresh");
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn queued_edits_are_flushed_in_the_background() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let remote = Arc::new(InMemoryRemoteStore::new(kpi_table("")));
    let cache = open_cache(&remote, &config(tmp.path()));

    remote.fail_next_uploads(3, RemoteError::Locked("checked out".into()));
    cache
        .save(PendingEdit::new("Finance", "1", Month::Jan, EditPayload::achieved("70")))
        .await
        .expect("save");
    assert_eq!(cache.pending_count().await, 1);

    let handle = spawn_refresher(Arc::clone(&cache), EVERY);
    tokio::time::sleep(EVERY + Duration::from_secs(1)).await;

    assert_eq!(cache.pending_count().await, 0);
    let remote_table = remote.table().expect("remote table");
    assert_eq!(achieved(&remote_table, "Finance", "1", Month::Jan).as_deref(), Some("70"));
    handle.shutdown().await;
}
