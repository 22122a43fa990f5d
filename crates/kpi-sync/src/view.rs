//! Read-only projections of the table for one sector.

use serde::Serialize;

use crate::kpi::{display_number, parse_number, KpiKind};
use crate::layout::SheetLayout;
use crate::period::{EvaluationPeriod, Month};
use crate::table::Table;

/// One KPI as shown on the result-entry page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiRecord {
    pub sector: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: KpiKind,
    pub previous_target: String,
    pub previous_achieved: String,
    pub target: String,
    pub achieved: String,
    pub justification: String,
    pub countermeasure: String,
    pub countermeasure_due: String,
    pub countermeasure_owner: String,
    /// A result was already entered for the evaluation month. Submitted
    /// records are shown read-only.
    pub submitted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCell {
    pub month: Month,
    pub target: Option<String>,
    pub actual: Option<String>,
}

/// A KPI's full year, as shown on the historic page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricKpi {
    pub sector: String,
    pub id: String,
    pub name: String,
    pub kind: KpiKind,
    pub unit: Option<String>,
    pub annual_result: Option<String>,
    pub basic_target: Option<String>,
    pub challenge_target: Option<String>,
    /// January first, always twelve entries.
    pub months: Vec<MonthCell>,
    /// Sum of the parseable monthly results; `None` if there are none.
    pub year_to_date: Option<f64>,
}

impl HistoricKpi {
    pub fn month(&self, month: Month) -> &MonthCell {
        &self.months[month as usize]
    }
}

fn trimmed(table: &Table, row: usize, column: &str) -> String {
    table.text(row, column).trim().to_string()
}

fn optional(table: &Table, row: usize, column: &str) -> Option<String> {
    Some(trimmed(table, row, column)).filter(|v| !v.is_empty())
}

pub fn current_records(
    table: &Table,
    layout: &SheetLayout,
    sector: &str,
    period: EvaluationPeriod,
) -> Vec<KpiRecord> {
    let current = layout.period_columns(period.current);
    table
        .rows_for_sector(&layout.sector, sector)
        .map(|row| {
            let achieved = trimmed(table, row, &current.achieved);
            KpiRecord {
                sector: trimmed(table, row, &layout.sector),
                id: trimmed(table, row, &layout.id),
                name: trimmed(table, row, &layout.name),
                description: trimmed(table, row, &layout.description),
                kind: KpiKind::parse(table.text(row, &layout.kind)),
                previous_target: trimmed(table, row, layout.target(period.previous)),
                previous_achieved: trimmed(table, row, &layout.achieved(period.previous)),
                target: trimmed(table, row, layout.target(period.current)),
                submitted: !achieved.is_empty(),
                achieved,
                justification: trimmed(table, row, &current.justification),
                countermeasure: trimmed(table, row, &current.countermeasure),
                countermeasure_due: trimmed(table, row, &current.due_date),
                countermeasure_owner: trimmed(table, row, &current.owner),
            }
        })
        .collect()
}

pub fn historic_records(table: &Table, layout: &SheetLayout, sector: &str) -> Vec<HistoricKpi> {
    table
        .rows_for_sector(&layout.sector, sector)
        .map(|row| {
            let mut ytd = None;
            let months = Month::ALL
                .into_iter()
                .map(|month| {
                    let raw = table.text(row, &layout.achieved(month));
                    if let Ok(Some(value)) = parse_number(raw) {
                        *ytd.get_or_insert(0.0) += value;
                    }
                    MonthCell {
                        month,
                        target: display_number(table.text(row, layout.target(month))),
                        actual: display_number(raw),
                    }
                })
                .collect();
            HistoricKpi {
                sector: trimmed(table, row, &layout.sector),
                id: trimmed(table, row, &layout.id),
                name: trimmed(table, row, &layout.name),
                kind: KpiKind::parse(table.text(row, &layout.kind)),
                unit: optional(table, row, &layout.units),
                annual_result: display_number(table.text(row, &layout.annual_result)),
                basic_target: display_number(table.text(row, &layout.basic_target)),
                challenge_target: display_number(table.text(row, &layout.challenge_target)),
                months,
                year_to_date: ytd,
            }
        })
        .collect()
}
