use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{mentions_lock, RemoteStore};
use crate::error::RemoteError;
use crate::table::Table;

/// A workbook published into a shared directory (e.g. a synced document
/// library mounted on the host).
///
/// The document is a JSON-encoded [`Table`]. Another writer checks the
/// document out by creating a sibling `<file>.lock`; while it exists, uploads
/// fail with [`RemoteError::Locked`].
#[derive(Debug, Clone)]
pub struct DirRemoteStore {
    document: PathBuf,
}

impl DirRemoteStore {
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
        }
    }

    pub fn document(&self) -> &Path {
        &self.document
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .document
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".lock");
        self.document.with_file_name(name)
    }
}

fn join_error(err: tokio::task::JoinError) -> RemoteError {
    RemoteError::Unavailable(format!("document io task failed: {err}"))
}

#[async_trait]
impl RemoteStore for DirRemoteStore {
    async fn fetch(&self) -> Result<Table, RemoteError> {
        let path = self.document.clone();
        let bytes = tokio::task::spawn_blocking(move || kpi_fs::read_if_exists(&path))
            .await
            .map_err(join_error)?
            .map_err(|err| RemoteError::Unavailable(format!("read {}: {err}", self.document.display())))?
            .ok_or_else(|| RemoteError::Unavailable(format!("{} does not exist", self.document.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| RemoteError::Unavailable(format!("malformed document {}: {err}", self.document.display())))
    }

    async fn upload(&self, table: &Table) -> Result<(), RemoteError> {
        let lock_path = self.lock_path();
        let document = self.document.clone();
        let table = table.clone();
        tokio::task::spawn_blocking(move || {
            if lock_path.exists() {
                return Err(RemoteError::Locked(format!(
                    "{} is checked out by another writer",
                    document.display()
                )));
            }
            kpi_fs::atomic_write_json(&document, &table).map_err(|err| {
                let message = format!("write {}: {err}", document.display());
                if mentions_lock(&message) {
                    RemoteError::Locked(message)
                } else {
                    RemoteError::Unavailable(message)
                }
            })
        })
        .await
        .map_err(join_error)?
    }

    fn describe(&self) -> String {
        self.document.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(
            vec!["Title".into(), "序号 No.".into()],
            vec![vec!["Finance".into(), "1".into()]],
        )
    }

    #[tokio::test]
    async fn upload_then_fetch_returns_the_same_table() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = DirRemoteStore::new(tmp.path().join("library").join("KPISystem.json"));

        store.upload(&table()).await.expect("upload");
        assert_eq!(store.fetch().await.expect("fetch"), table());
    }

    #[tokio::test]
    async fn missing_document_is_unavailable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = DirRemoteStore::new(tmp.path().join("KPISystem.json"));
        let err = store.fetch().await.expect_err("missing document");
        assert!(matches!(err, RemoteError::Unavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn lock_file_blocks_uploads_but_not_fetches() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = DirRemoteStore::new(tmp.path().join("KPISystem.json"));
        store.upload(&table()).await.expect("initial upload");

        assert_eq!(store.lock_path(), tmp.path().join("KPISystem.json.lock"));
        std::fs::write(store.lock_path(), b"admin").expect("create lock");

        let err = store.upload(&Table::empty()).await.expect_err("locked");
        assert!(err.is_locked(), "{err:?}");
        assert_eq!(store.fetch().await.expect("fetch while locked"), table());

        std::fs::remove_file(store.lock_path()).expect("release lock");
        store.upload(&Table::empty()).await.expect("upload after release");
    }
}
