use std::path::PathBuf;

use thiserror::Error;

use crate::queue::EditKey;

/// Failure talking to the remote document store.
///
/// The two kinds are kept apart because they are handled differently: a lock is
/// expected to clear on its own and is retried, anything else is treated as the
/// remote being unreachable for now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("remote document locked: {0}")]
    Locked(String),
}

impl RemoteError {
    pub fn is_locked(&self) -> bool {
        matches!(self, RemoteError::Locked(_))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("no row for {0} in the current table")]
    RecordNotFound(EditKey),
    /// A local durable write failed. This is the one error callers must see: it
    /// is the only way a queued edit could be lost.
    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt state file {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, SyncError::Persistence { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
