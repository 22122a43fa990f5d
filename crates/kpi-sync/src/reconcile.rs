//! Merging queued local edits into a freshly loaded table.
//!
//! The rule is "remote wins on presence": a queued edit only ever fills an
//! empty achieved cell. Where a table fetched from the remote already holds a
//! value, the edit is resolved by the remote and dropped from the queue, and
//! the row is left exactly as fetched. A local fallback copy is not
//! authoritative: it may hold our own unconfirmed write (which is re-applied)
//! and any other value is left alone with the edit kept queued until the
//! remote can be read again.

use crate::cache::SnapshotSource;
use crate::error::{Result, SyncError};
use crate::layout::SheetLayout;
use crate::queue::{EditKey, PendingEdit};
use crate::table::{is_blank, Table};

/// What reconciliation decided for each queued edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Edits now reflected in the table (filled into an empty cell, or a local
    /// copy already holding the queued value). They stay queued until an
    /// upload confirms them.
    pub applied: Vec<EditKey>,
    /// Edits superseded by a value already present remotely; to be dequeued.
    pub resolved_by_remote: Vec<EditKey>,
    /// Edits whose row does not exist in the table. Kept queued.
    pub orphaned: Vec<EditKey>,
    /// Edits conflicting with a non-authoritative (local fallback) table. Kept
    /// queued and left out of the table.
    pub deferred: Vec<EditKey>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
            && self.resolved_by_remote.is_empty()
            && self.orphaned.is_empty()
            && self.deferred.is_empty()
    }
}

/// Reconcile `edits` into `table` in place.
///
/// The outcome depends only on `table`, `edits` and `source`, and a non-empty
/// achieved cell in a remote table is never written to.
pub fn reconcile(
    table: &mut Table,
    edits: &[PendingEdit],
    layout: &SheetLayout,
    source: SnapshotSource,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for edit in edits {
        let key = edit.key();
        let Some(row) = find_edit_row(table, edit, layout) else {
            tracing::warn!(
                sector = %edit.sector,
                record_key = %edit.record_key,
                period = %edit.period,
                "queued edit has no matching row; keeping it queued"
            );
            report.orphaned.push(key);
            continue;
        };

        let achieved_column = layout.achieved(edit.period);
        let present = table.text(row, &achieved_column).trim().to_string();
        let own_local_write =
            source == SnapshotSource::LocalFallback && present == edit.payload.achieved.trim();
        if is_blank(&present) || own_local_write {
            write_payload(table, row, edit, layout);
            report.applied.push(key);
            continue;
        }

        match source {
            SnapshotSource::Remote => {
                tracing::info!(
                    sector = %edit.sector,
                    record_key = %edit.record_key,
                    period = %edit.period,
                    remote = %present,
                    queued = %edit.payload.achieved,
                    "remote already holds a value; dropping queued edit"
                );
                report.resolved_by_remote.push(key);
            }
            SnapshotSource::LocalFallback => {
                tracing::debug!(edit = %key, "conflict against local copy; deferring until remote is readable");
                report.deferred.push(key);
            }
        }
    }
    report
}

/// Write `edit` onto its row regardless of what the row holds.
///
/// Used by the save path, where the edit is the newest intent for the cell.
pub fn apply_edit(table: &mut Table, edit: &PendingEdit, layout: &SheetLayout) -> Result<usize> {
    let row = find_edit_row(table, edit, layout).ok_or_else(|| SyncError::RecordNotFound(edit.key()))?;
    write_payload(table, row, edit, layout);
    Ok(row)
}

/// Whether `table` already carries the achieved value of `edit`.
pub fn is_reflected(table: &Table, edit: &PendingEdit, layout: &SheetLayout) -> bool {
    find_edit_row(table, edit, layout).is_some_and(|row| {
        table.text(row, &layout.achieved(edit.period)).trim() == edit.payload.achieved.trim()
    })
}

fn find_edit_row(table: &Table, edit: &PendingEdit, layout: &SheetLayout) -> Option<usize> {
    table.find_row(&layout.sector, &edit.sector, &layout.id, &edit.record_key)
}

fn write_payload(table: &mut Table, row: usize, edit: &PendingEdit, layout: &SheetLayout) {
    let columns = layout.period_columns(edit.period);
    let payload = &edit.payload;
    table.set_cell(row, &columns.achieved, payload.achieved.trim());
    // Justification fields are only written together, and only when a
    // justification was actually given.
    if !is_blank(&payload.justification) {
        table.set_cell(row, &columns.justification, payload.justification.as_str());
        table.set_cell(row, &columns.countermeasure, payload.countermeasure.as_str());
        table.set_cell(row, &columns.due_date, payload.countermeasure_due.as_str());
        table.set_cell(row, &columns.owner, payload.countermeasure_owner.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Month;
    use crate::queue::EditPayload;
    use pretty_assertions::assert_eq;

    fn table(finance_jan: &str) -> Table {
        let layout = SheetLayout::default();
        Table::new(
            vec![layout.sector.clone(), layout.id.clone(), layout.achieved(Month::Jan)],
            vec![
                vec!["Finance".into(), "1".into(), finance_jan.into()],
                vec!["Quality".into(), "1".into(), String::new()],
            ],
        )
    }

    fn edit(sector: &str, key: &str, achieved: &str) -> PendingEdit {
        PendingEdit::new(sector, key, Month::Jan, EditPayload::achieved(achieved))
    }

    #[test]
    fn empty_remote_cell_is_filled_and_edit_stays_queued() {
        let layout = SheetLayout::default();
        let mut t = table("");
        let edits = vec![edit("finance", "1", "70")];

        let report = reconcile(&mut t, &edits, &layout, SnapshotSource::Remote);

        assert_eq!(t.text(0, "Achieved Jan"), "70");
        assert_eq!(report.applied, vec![edits[0].key()]);
        assert!(report.resolved_by_remote.is_empty());
    }

    #[test]
    fn non_empty_remote_value_wins() {
        let layout = SheetLayout::default();
        let mut t = table("90");
        let edits = vec![edit("Finance", "1", "70")];

        let report = reconcile(&mut t, &edits, &layout, SnapshotSource::Remote);

        assert_eq!(t.text(0, "Achieved Jan"), "90");
        assert_eq!(report.resolved_by_remote, vec![edits[0].key()]);
        assert!(report.applied.is_empty());
    }

    #[test]
    fn conflicts_against_local_copy_are_deferred_not_resolved() {
        let layout = SheetLayout::default();
        let mut t = table("90");
        let edits = vec![edit("Finance", "1", "70")];

        let report = reconcile(&mut t, &edits, &layout, SnapshotSource::LocalFallback);

        assert_eq!(t.text(0, "Achieved Jan"), "90");
        assert_eq!(report.deferred, vec![edits[0].key()]);
        assert!(report.resolved_by_remote.is_empty());
    }

    #[test]
    fn missing_rows_are_orphaned() {
        let layout = SheetLayout::default();
        let mut t = table("");
        let before = t.clone();
        let edits = vec![edit("Finance", "42", "1"), edit("Logistics", "1", "2")];

        let report = reconcile(&mut t, &edits, &layout, SnapshotSource::Remote);

        assert_eq!(t, before);
        assert_eq!(report.orphaned.len(), 2);
    }

    #[test]
    fn reconciling_the_same_fetch_twice_gives_the_same_result() {
        let layout = SheetLayout::default();
        let edits = vec![
            edit("Finance", "1", "70"),
            edit("Quality", "1", "5"),
            edit("Finance", "9", "1"),
        ];

        let mut once = table("");
        let first = reconcile(&mut once, &edits, &layout, SnapshotSource::Remote);
        let mut again = table("");
        let second = reconcile(&mut again, &edits, &layout, SnapshotSource::Remote);

        assert_eq!(again, once);
        assert_eq!(second, first);
        assert_eq!(first.applied.len(), 2);
        assert_eq!(first.orphaned.len(), 1);
    }

    #[test]
    fn remote_row_holding_the_queued_value_is_left_untouched() {
        let layout = SheetLayout::default();
        let mut fetched = table("70");
        fetched.set_cell(0, "Justification - Jan", "remote reason");
        fetched.set_cell(0, "Responsible - Jan", "Wang");
        let before = fetched.clone();
        let edits = vec![PendingEdit::new(
            "Finance",
            "1",
            Month::Jan,
            EditPayload::achieved("70").with_justification("local reason", "recount", "2025-02-28", "Ana"),
        )];

        let report = reconcile(&mut fetched, &edits, &layout, SnapshotSource::Remote);

        assert_eq!(fetched, before);
        assert_eq!(fetched.text(0, "Justification - Jan"), "remote reason");
        assert_eq!(report.resolved_by_remote, vec![edits[0].key()]);
        assert!(report.applied.is_empty());
    }

    #[test]
    fn local_copy_holding_our_own_write_keeps_the_edit_queued() {
        let layout = SheetLayout::default();
        let mut local = table("70");
        let edits = vec![edit("Finance", "1", "70")];

        let report = reconcile(&mut local, &edits, &layout, SnapshotSource::LocalFallback);

        assert_eq!(local.text(0, "Achieved Jan"), "70");
        assert_eq!(report.applied, vec![edits[0].key()]);
        assert!(report.resolved_by_remote.is_empty());
        assert!(report.deferred.is_empty());
    }

    #[test]
    fn justification_fields_are_written_only_with_a_justification() {
        let layout = SheetLayout::default();
        let mut t = table("");
        let bare = edit("Finance", "1", "70");
        apply_edit(&mut t, &bare, &layout).expect("row exists");
        assert!(!t.has_column("Justification - Jan"));

        let justified = PendingEdit::new(
            "Finance",
            "1",
            Month::Jan,
            EditPayload::achieved("60").with_justification("supplier delay", "dual source", "2025-03-31", "Li"),
        );
        apply_edit(&mut t, &justified, &layout).expect("row exists");
        assert_eq!(t.text(0, "Achieved Jan"), "60");
        assert_eq!(t.text(0, "Justification - Jan"), "supplier delay");
        assert_eq!(t.text(0, "Countermeasure - Jan"), "dual source");
        assert_eq!(t.text(0, "Countermeasure Date - Jan"), "2025-03-31");
        assert_eq!(t.text(0, "Responsible - Jan"), "Li");
        assert!(is_reflected(&t, &justified, &layout));
        assert!(!is_reflected(&t, &bare, &layout));
    }

    #[test]
    fn apply_edit_reports_missing_record() {
        let layout = SheetLayout::default();
        let mut t = table("");
        let err = apply_edit(&mut t, &edit("Finance", "404", "1"), &layout).expect_err("no row");
        assert!(matches!(err, SyncError::RecordNotFound(key) if key.record_key == "404"));
    }
}
