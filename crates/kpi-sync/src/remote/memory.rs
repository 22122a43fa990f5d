use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::RemoteStore;
use crate::error::RemoteError;
use crate::table::Table;

#[derive(Debug, Default)]
struct Inner {
    table: Option<Table>,
    offline: bool,
    fetch_failures: VecDeque<RemoteError>,
    upload_failures: VecDeque<RemoteError>,
    fetch_delay: Duration,
    fetches: usize,
    uploads: usize,
}

/// In-process remote store with scriptable failures.
///
/// Useful for tests and local demos: failures can be queued per operation,
/// the whole store can be taken offline, and fetches can be slowed down to
/// observe concurrent refresh behavior.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    inner: Mutex<Inner>,
}

impl InMemoryRemoteStore {
    pub fn new(table: Table) -> Self {
        Self {
            inner: Mutex::new(Inner {
                table: Some(table),
                ..Inner::default()
            }),
        }
    }

    /// A store with no document at all; fetches fail until one is set.
    pub fn empty() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("remote store mutex poisoned")
    }

    pub fn table(&self) -> Option<Table> {
        self.lock().table.clone()
    }

    pub fn set_table(&self, table: Table) {
        self.lock().table = Some(table);
    }

    /// Mutate the remote document in place, as another writer would.
    pub fn update(&self, f: impl FnOnce(&mut Table)) {
        let mut inner = self.lock();
        f(inner.table.get_or_insert_with(Table::empty));
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn fail_next_fetches(&self, count: usize, err: RemoteError) {
        let mut inner = self.lock();
        inner.fetch_failures.extend(std::iter::repeat(err).take(count));
    }

    pub fn fail_next_uploads(&self, count: usize, err: RemoteError) {
        let mut inner = self.lock();
        inner.upload_failures.extend(std::iter::repeat(err).take(count));
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.lock().fetch_delay = delay;
    }

    /// Number of fetch calls, successful or not.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Number of upload calls, successful or not.
    pub fn upload_count(&self) -> usize {
        self.lock().uploads
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch(&self) -> Result<Table, RemoteError> {
        let delay = {
            let mut inner = self.lock();
            inner.fetches += 1;
            inner.fetch_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        if let Some(err) = inner.fetch_failures.pop_front() {
            return Err(err);
        }
        if inner.offline {
            return Err(RemoteError::Unavailable("remote store is offline".into()));
        }
        inner
            .table
            .clone()
            .ok_or_else(|| RemoteError::Unavailable("remote document does not exist".into()))
    }

    async fn upload(&self, table: &Table) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.uploads += 1;
        if let Some(err) = inner.upload_failures.pop_front() {
            return Err(err);
        }
        if inner.offline {
            return Err(RemoteError::Unavailable("remote store is offline".into()));
        }
        inner.table = Some(table.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
