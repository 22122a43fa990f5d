//! Adapters for the authoritative copy of the KPI workbook.

mod dir;
mod http;
mod memory;

pub use dir::DirRemoteStore;
pub use http::HttpRemoteStore;
pub use memory::InMemoryRemoteStore;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::table::Table;

/// The remote source of truth for the KPI table.
///
/// Implementations never retry on their own; retry and fallback policy lives in
/// [`crate::SyncCache`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Download the current table. Any failure is [`RemoteError::Unavailable`].
    async fn fetch(&self) -> Result<Table, RemoteError>;

    /// Replace the remote table. Fails with [`RemoteError::Locked`] when another
    /// writer holds the document, [`RemoteError::Unavailable`] otherwise.
    async fn upload(&self, table: &Table) -> Result<(), RemoteError>;

    /// Short human-readable location for logs.
    fn describe(&self) -> String;
}

/// Whether a free-form failure message describes lock contention.
///
/// Document servers report checkout conflicts in prose rather than with a
/// dedicated status on some paths.
pub(crate) fn mentions_lock(message: &str) -> bool {
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    words
        .iter()
        .any(|w| matches!(*w, "lock" | "locked" | "locking"))
        || words.windows(2).any(|pair| matches!(pair, ["checked", "out"] | ["in", "use"]))
}

#[cfg(test)]
mod tests {
    use super::mentions_lock;

    #[test]
    fn lock_messages_are_recognized() {
        assert!(mentions_lock("The file is LOCKED for shared use"));
        assert!(mentions_lock("Document is checked out by admin@example.com"));
        assert!(mentions_lock("file in use"));
        assert!(mentions_lock("lock held by another session"));
        assert!(!mentions_lock("connection reset by peer"));
    }

    #[test]
    fn words_merely_containing_lock_are_not_contention() {
        assert!(!mentions_lock("block storage unavailable"));
        assert!(!mentions_lock("clock skew too large"));
        assert!(!mentions_lock("unlockable quota exceeded"));
        assert!(!mentions_lock("user in-progress"));
    }
}
