use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::durable;
use crate::error::Result;
use crate::period::Month;
use crate::table::sector_eq;

/// Identity of a queued edit: at most one edit per key is ever queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditKey {
    pub sector: String,
    pub record_key: String,
    pub period: Month,
}

impl EditKey {
    pub fn new(sector: impl Into<String>, record_key: impl Into<String>, period: Month) -> Self {
        Self {
            sector: sector.into(),
            record_key: record_key.into(),
            period,
        }
    }

    /// Sectors compare trimmed and case-insensitively, record keys trimmed.
    pub fn matches(&self, other: &EditKey) -> bool {
        self.period == other.period
            && self.record_key.trim() == other.record_key.trim()
            && sector_eq(&self.sector, &other.sector)
    }
}

impl fmt::Display for EditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.sector.trim(), self.record_key.trim(), self.period)
    }
}

/// The mutable fields of a KPI row for one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPayload {
    pub achieved: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub countermeasure: String,
    #[serde(default)]
    pub countermeasure_due: String,
    #[serde(default)]
    pub countermeasure_owner: String,
}

impl EditPayload {
    pub fn achieved(value: impl Into<String>) -> Self {
        Self {
            achieved: value.into(),
            ..Self::default()
        }
    }

    pub fn with_justification(
        mut self,
        justification: impl Into<String>,
        countermeasure: impl Into<String>,
        due: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        self.justification = justification.into();
        self.countermeasure = countermeasure.into();
        self.countermeasure_due = due.into();
        self.countermeasure_owner = owner.into();
        self
    }
}

/// A submitted value that has not been confirmed against the remote workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub sector: String,
    pub record_key: String,
    pub period: Month,
    /// Display name at submission time, kept for operators inspecting the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub payload: EditPayload,
}

impl PendingEdit {
    pub fn new(
        sector: impl Into<String>,
        record_key: impl Into<String>,
        period: Month,
        payload: EditPayload,
    ) -> Self {
        Self {
            sector: sector.into(),
            record_key: record_key.into(),
            period,
            record_name: None,
            recorded_at: Utc::now(),
            payload,
        }
    }

    pub fn with_record_name(mut self, name: impl Into<String>) -> Self {
        self.record_name = Some(name.into());
        self
    }

    pub fn key(&self) -> EditKey {
        EditKey::new(self.sector.clone(), self.record_key.clone(), self.period)
    }

    fn has_key(&self, key: &EditKey) -> bool {
        self.period == key.period
            && self.record_key.trim() == key.record_key.trim()
            && sector_eq(&self.sector, &key.sector)
    }
}

/// Durable list of edits waiting for a confirmed remote write.
///
/// Every mutation is written to disk (atomically) before the in-memory list
/// changes, so a failed write leaves both views on the previous state.
#[derive(Debug)]
pub struct PendingWriteQueue {
    path: PathBuf,
    edits: Vec<PendingEdit>,
}

impl PendingWriteQueue {
    pub const FILE_NAME: &'static str = "pending_queue.json";

    /// Open the queue stored in `dir`. A missing file is an empty queue; an
    /// unreadable or corrupt file is an error rather than a silently empty queue.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_path(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let edits: Vec<PendingEdit> = durable::read_json(&path)?.unwrap_or_default();
        if !edits.is_empty() {
            tracing::info!(pending = edits.len(), path = %path.display(), "loaded pending edits");
        }
        Ok(Self { path, edits })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert `edit`, replacing any queued edit with the same key.
    pub fn enqueue(&mut self, edit: PendingEdit) -> Result<()> {
        let key = edit.key();
        let mut next: Vec<PendingEdit> = self
            .edits
            .iter()
            .filter(|queued| !queued.has_key(&key))
            .cloned()
            .collect();
        let replaced = next.len() != self.edits.len();
        next.push(edit);
        self.commit(next)?;
        tracing::debug!(edit = %key, replaced, pending = self.edits.len(), "edit queued");
        Ok(())
    }

    /// Remove the edit for `key`. Returns whether anything was removed; removing
    /// an absent key is not an error.
    pub fn dequeue(&mut self, key: &EditKey) -> Result<bool> {
        Ok(self.dequeue_all(std::slice::from_ref(key))? > 0)
    }

    /// Remove every edit matching one of `keys` with a single durable write.
    pub fn dequeue_all(&mut self, keys: &[EditKey]) -> Result<usize> {
        let next: Vec<PendingEdit> = self
            .edits
            .iter()
            .filter(|queued| !keys.iter().any(|key| queued.has_key(key)))
            .cloned()
            .collect();
        let removed = self.edits.len() - next.len();
        if removed > 0 {
            self.commit(next)?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> &[PendingEdit] {
        &self.edits
    }

    pub fn get(&self, key: &EditKey) -> Option<&PendingEdit> {
        self.edits.iter().find(|edit| edit.has_key(key))
    }

    pub fn count(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    fn commit(&mut self, next: Vec<PendingEdit>) -> Result<()> {
        durable::write_json(&self.path, &next)?;
        self.edits = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(sector: &str, key: &str, achieved: &str) -> PendingEdit {
        PendingEdit::new(sector, key, Month::Jan, EditPayload::achieved(achieved))
    }

    #[test]
    fn keys_match_sector_case_insensitively() {
        let a = EditKey::new("Finance", "1", Month::Jan);
        assert!(a.matches(&EditKey::new(" finance", "1 ", Month::Jan)));
        assert!(!a.matches(&EditKey::new("Finance", "1", Month::Feb)));
        assert!(!a.matches(&EditKey::new("Finance", "10", Month::Jan)));
        assert_eq!(a.to_string(), "Finance/1/Jan");
    }

    #[test]
    fn enqueue_replaces_edit_with_same_key() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut queue = PendingWriteQueue::open(tmp.path()).expect("open");

        queue.enqueue(edit("Finance", "1", "70")).expect("enqueue");
        queue.enqueue(edit("Quality", "1", "10")).expect("enqueue");
        queue.enqueue(edit("FINANCE", "1", "75")).expect("enqueue");

        assert_eq!(queue.count(), 2);
        let finance = queue
            .get(&EditKey::new("finance", "1", Month::Jan))
            .expect("finance edit");
        assert_eq!(finance.payload.achieved, "75");
    }

    #[test]
    fn dequeue_of_absent_key_is_a_noop() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut queue = PendingWriteQueue::open(tmp.path()).expect("open");
        let removed = queue
            .dequeue(&EditKey::new("Finance", "1", Month::Jan))
            .expect("dequeue");
        assert!(!removed);
        assert!(!queue.path().exists(), "no-op dequeue should not touch disk");
    }

    #[test]
    fn empty_payload_fields_default_when_missing_from_disk() {
        let raw = r#"{
            "sector": "Finance",
            "record_key": "3",
            "period": "Feb",
            "recorded_at": "2025-03-02T10:00:00Z",
            "payload": { "achieved": "12" }
        }"#;
        let edit: PendingEdit = serde_json::from_str(raw).expect("parse edit");
        assert_eq!(edit.payload, EditPayload::achieved("12"));
        assert_eq!(edit.record_name, None);
    }
}
