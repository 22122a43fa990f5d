use std::path::Path;

use kpi_fs::AtomicWriteError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SyncError};

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    kpi_fs::atomic_write_json(path, value).map_err(|err| SyncError::Persistence {
        path: path.to_path_buf(),
        source: match err {
            AtomicWriteError::Io(err) => err,
            AtomicWriteError::Writer(err) => err.into(),
        },
    })
}

/// `Ok(None)` when the file has never been written.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let Some(bytes) = kpi_fs::read_if_exists(path).map_err(|source| SyncError::Persistence {
        path: path.to_path_buf(),
        source,
    })?
    else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| SyncError::CorruptState {
            path: path.to_path_buf(),
            source,
        })
}
