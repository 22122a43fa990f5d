use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::durable;
use crate::error::{RemoteError, Result};
use crate::layout::SheetLayout;
use crate::queue::{EditKey, PendingEdit, PendingWriteQueue};
use crate::reconcile::{self, ReconcileReport};
use crate::remote::RemoteStore;
use crate::retry::{retry_remote, RetryPolicy};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Remote,
    LocalFallback,
}

/// An immutable view of the table as of one refresh (plus any local edits
/// applied since).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub table: Table,
    pub fetched_at: DateTime<Utc>,
    pub source: SnapshotSource,
    loaded_at: Instant,
}

impl Snapshot {
    fn new(table: Table, source: SnapshotSource) -> Self {
        Self {
            table,
            fetched_at: Utc::now(),
            source,
            loaded_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    fn with_table(&self, table: Table) -> Self {
        Self {
            table,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Empty,
    Fetching,
    Fresh,
    Stale,
    /// The last refresh could not reach the remote; serving the local copy.
    FetchFailed,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub snapshot: Arc<Snapshot>,
    pub reconcile: ReconcileReport,
    /// Set when the remote fetch failed and the snapshot is a fallback.
    pub fetch_error: Option<RemoteError>,
    pub local_copy_persisted: bool,
}

impl RefreshReport {
    pub fn source(&self) -> SnapshotSource {
        self.snapshot.source
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    /// No row matches the edit's sector and record key.
    RecordNotFound,
    /// The current table is a local fallback copy; uploading it could clobber
    /// remote data.
    RemoteUnavailable,
    UploadFailed { attempts: usize, last_error: RemoteError },
}

/// Result of a save that did not fail outright.
///
/// `Deferred` still means the edit is durably queued and visible locally; it
/// will be reconciled and uploaded on a later cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Synced,
    Deferred(DeferReason),
    /// The refresh taken before applying the edit found the cell already
    /// filled remotely; the edit was dropped and nothing was uploaded.
    ResolvedByRemote,
}

impl SaveOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SaveOutcome::Synced)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    NothingToFlush,
    Flushed { edits: usize },
    Deferred(DeferReason),
}

struct RefreshingGuard<'a>(&'a AtomicBool);

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Time-bounded cache of the remote KPI table with a durable queue of
/// unconfirmed edits.
///
/// Refreshes, saves and flushes serialize on one async mutex which owns the
/// queue. Readers never take that mutex while a usable snapshot is published:
/// the current snapshot lives behind its own lock and is swapped wholesale.
pub struct SyncCache {
    remote: Arc<dyn RemoteStore>,
    layout: SheetLayout,
    ttl: Duration,
    remote_timeout: Duration,
    retry: RetryPolicy,
    table_path: PathBuf,
    queue: Mutex<PendingWriteQueue>,
    published: RwLock<Option<Arc<Snapshot>>>,
    refreshing: AtomicBool,
}

impl SyncCache {
    pub const TABLE_FILE_NAME: &'static str = "table.json";

    /// Open the cache rooted at `config.cache_dir`. Fails only if the queue
    /// file exists but cannot be read or parsed.
    pub fn open(remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Result<Self> {
        let queue = PendingWriteQueue::open(&config.cache_dir)?;
        Ok(Self {
            remote,
            layout: config.layout.clone(),
            ttl: config.ttl(),
            remote_timeout: config.remote_timeout(),
            retry: config.retry.clone(),
            table_path: config.cache_dir.join(Self::TABLE_FILE_NAME),
            queue: Mutex::new(queue),
            published: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn local_copy_path(&self) -> &Path {
        &self.table_path
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CacheState {
        if self.is_refreshing() {
            return CacheState::Fetching;
        }
        match self.published() {
            None => CacheState::Empty,
            Some(s) if s.source == SnapshotSource::LocalFallback => CacheState::FetchFailed,
            Some(s) if s.is_stale(self.ttl) => CacheState::Stale,
            Some(_) => CacheState::Fresh,
        }
    }

    /// The last published snapshot, without triggering a refresh.
    pub fn published(&self) -> Option<Arc<Snapshot>> {
        self.published.read().expect("snapshot lock poisoned").clone()
    }

    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.published.write().expect("snapshot lock poisoned") = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn fresh_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published().filter(|s| !s.is_stale(self.ttl))
    }

    /// Return the cached snapshot, refreshing it first when it is stale or
    /// `force` is set.
    ///
    /// Never fails: an unreachable remote yields the local copy (or an empty
    /// table) marked [`SnapshotSource::LocalFallback`]. While another task
    /// holds the cache (refreshing or saving), non-forced callers get the
    /// snapshot that is currently published instead of waiting.
    pub async fn get_snapshot(&self, force: bool) -> Arc<Snapshot> {
        if !force {
            if let Some(snapshot) = self.fresh_snapshot() {
                return snapshot;
            }
            if let Ok(mut queue) = self.queue.try_lock() {
                return self.ensure_fresh(&mut queue).await;
            }
            if let Some(snapshot) = self.published() {
                return snapshot;
            }
        }
        let mut queue = self.queue.lock().await;
        if force {
            self.refresh_locked(&mut queue).await.snapshot
        } else {
            self.ensure_fresh(&mut queue).await
        }
    }

    /// Refresh unconditionally and report what happened.
    pub async fn force_refresh(&self) -> RefreshReport {
        let mut queue = self.queue.lock().await;
        self.refresh_locked(&mut queue).await
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.lock().await.count()
    }

    pub async fn pending_edits(&self) -> Vec<PendingEdit> {
        self.queue.lock().await.list().to_vec()
    }

    // Re-checked under the lock: another task may have refreshed meanwhile.
    async fn ensure_fresh(&self, queue: &mut PendingWriteQueue) -> Arc<Snapshot> {
        match self.fresh_snapshot() {
            Some(snapshot) => snapshot,
            None => self.refresh_locked(queue).await.snapshot,
        }
    }

    /// Like `ensure_fresh`, but a fallback snapshot gets another fetch attempt
    /// since the caller is about to write to the remote. The report is empty
    /// when no refresh was needed.
    async fn ensure_writable(&self, queue: &mut PendingWriteQueue) -> (Arc<Snapshot>, ReconcileReport) {
        match self.fresh_snapshot() {
            Some(snapshot) if snapshot.source == SnapshotSource::Remote => (snapshot, ReconcileReport::default()),
            _ => {
                let report = self.refresh_locked(queue).await;
                (report.snapshot, report.reconcile)
            }
        }
    }

    async fn refresh_locked(&self, queue: &mut PendingWriteQueue) -> RefreshReport {
        self.refreshing.store(true, Ordering::SeqCst);
        let _guard = RefreshingGuard(&self.refreshing);

        let fetched = match tokio::time::timeout(self.remote_timeout, self.remote.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Unavailable(format!(
                "fetch timed out after {}s",
                self.remote_timeout.as_secs()
            ))),
        };
        let (mut table, source, fetch_error) = match fetched {
            Ok(table) => (table, SnapshotSource::Remote, None),
            Err(err) => {
                tracing::warn!(remote = %self.remote.describe(), error = %err, "fetch failed; falling back to local copy");
                (self.load_local_copy(), SnapshotSource::LocalFallback, Some(err))
            }
        };
        table.normalize_headers();

        let report = reconcile::reconcile(&mut table, queue.list(), &self.layout, source);
        if !report.resolved_by_remote.is_empty() {
            if let Err(err) = queue.dequeue_all(&report.resolved_by_remote) {
                tracing::error!(error = %err, "failed to drop edits resolved by remote; they stay queued");
            }
        }

        let local_copy_persisted = match durable::write_json(&self.table_path, &table) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to persist local table copy");
                false
            }
        };

        tracing::info!(
            source = ?source,
            rows = table.row_count(),
            applied = report.applied.len(),
            resolved_by_remote = report.resolved_by_remote.len(),
            orphaned = report.orphaned.len(),
            deferred = report.deferred.len(),
            pending = queue.count(),
            "snapshot refreshed"
        );

        let snapshot = self.publish(Snapshot::new(table, source));
        RefreshReport {
            snapshot,
            reconcile: report,
            fetch_error,
            local_copy_persisted,
        }
    }

    fn load_local_copy(&self) -> Table {
        match durable::read_json::<Table>(&self.table_path) {
            Ok(Some(table)) => table,
            Ok(None) => {
                tracing::warn!(path = %self.table_path.display(), "no local copy; serving an empty table");
                Table::empty()
            }
            Err(err) => {
                tracing::error!(error = %err, "local copy unreadable; serving an empty table");
                Table::empty()
            }
        }
    }

    /// Record `edit` durably, apply it locally, and try to upload.
    ///
    /// The edit is on disk before any remote call is made. Errors only when
    /// the edit could not be persisted to the queue or the local table copy.
    /// Every other failure leaves the edit queued and is reported as
    /// [`SaveOutcome::Deferred`]. A refresh taken here that finds the cell
    /// already filled drops the edit ([`SaveOutcome::ResolvedByRemote`]).
    pub async fn save(&self, edit: PendingEdit) -> Result<SaveOutcome> {
        let mut queue = self.queue.lock().await;
        queue.enqueue(edit.clone())?;

        let (snapshot, reconciled) = self.ensure_writable(&mut queue).await;
        if reconciled.resolved_by_remote.contains(&edit.key()) {
            tracing::info!(edit = %edit.key(), "remote filled the cell first; edit dropped");
            return Ok(SaveOutcome::ResolvedByRemote);
        }

        let mut table = snapshot.table.clone();
        if let Err(err) = reconcile::apply_edit(&mut table, &edit, &self.layout) {
            tracing::warn!(error = %err, "edit queued without a matching row");
            return Ok(SaveOutcome::Deferred(DeferReason::RecordNotFound));
        }
        durable::write_json(&self.table_path, &table)?;
        let snapshot = self.publish(snapshot.with_table(table));

        if snapshot.source == SnapshotSource::LocalFallback {
            tracing::info!(edit = %edit.key(), "remote unreachable; edit kept queued");
            return Ok(SaveOutcome::Deferred(DeferReason::RemoteUnavailable));
        }
        Ok(match self.upload_and_confirm(&mut queue, &snapshot.table).await {
            Ok(_) => SaveOutcome::Synced,
            Err(reason) => SaveOutcome::Deferred(reason),
        })
    }

    /// Upload the current table if it carries queued edits, and dequeue the
    /// edits it confirms.
    pub async fn flush_pending(&self) -> FlushOutcome {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return FlushOutcome::NothingToFlush;
        }
        let (snapshot, _) = self.ensure_writable(&mut queue).await;
        if snapshot.source == SnapshotSource::LocalFallback {
            return FlushOutcome::Deferred(DeferReason::RemoteUnavailable);
        }
        if self.reflected_keys(&queue, &snapshot.table).is_empty() {
            return FlushOutcome::NothingToFlush;
        }
        match self.upload_and_confirm(&mut queue, &snapshot.table).await {
            Ok(edits) => FlushOutcome::Flushed { edits },
            Err(reason) => FlushOutcome::Deferred(reason),
        }
    }

    fn reflected_keys(&self, queue: &PendingWriteQueue, table: &Table) -> Vec<EditKey> {
        queue
            .list()
            .iter()
            .filter(|edit| reconcile::is_reflected(table, edit, &self.layout))
            .map(PendingEdit::key)
            .collect()
    }

    async fn upload_once(&self, table: &Table) -> std::result::Result<(), RemoteError> {
        match tokio::time::timeout(self.remote_timeout, self.remote.upload(table)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Unavailable(format!(
                "upload timed out after {}s",
                self.remote_timeout.as_secs()
            ))),
        }
    }

    /// Upload `table`; on success dequeue every edit it carries and return how
    /// many that was.
    async fn upload_and_confirm(
        &self,
        queue: &mut PendingWriteQueue,
        table: &Table,
    ) -> std::result::Result<usize, DeferReason> {
        let uploaded = retry_remote(&self.retry, "upload", |_| self.upload_once(table)).await;
        if let Err(exhausted) = uploaded {
            tracing::warn!(
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                pending = queue.count(),
                "upload failed; edits stay queued"
            );
            return Err(DeferReason::UploadFailed {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error,
            });
        }

        let confirmed = self.reflected_keys(queue, table);
        let removed = match queue.dequeue_all(&confirmed) {
            Ok(removed) => {
                tracing::info!(confirmed = removed, pending = queue.count(), "upload confirmed");
                removed
            }
            // The remote has the values; the edits will be confirmed again later.
            Err(err) => {
                tracing::error!(error = %err, "upload succeeded but the queue could not be updated");
                0
            }
        };
        self.publish(Snapshot::new(table.clone(), SnapshotSource::Remote));
        Ok(removed)
    }
}
