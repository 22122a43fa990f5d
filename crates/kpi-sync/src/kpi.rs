//! How a KPI's result is judged against its target.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::is_blank;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiKind {
    /// Result must match the target text.
    Text,
    /// Higher is better.
    #[default]
    GreaterThan,
    /// Lower is better.
    LowerThan,
}

impl KpiKind {
    /// Parse the free-form "Type" cell. Anything unrecognized is `GreaterThan`.
    pub fn parse(cell: &str) -> KpiKind {
        let upper = cell.trim().to_uppercase();
        if upper.contains("TEXT") {
            KpiKind::Text
        } else if upper.contains("LOWER") {
            KpiKind::LowerThan
        } else {
            KpiKind::GreaterThan
        }
    }
}

impl fmt::Display for KpiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KpiKind::Text => "TEXT",
            KpiKind::GreaterThan => "GREATER_THAN",
            KpiKind::LowerThan => "LOWER_THAN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a number: {0:?}")]
pub struct ParseNumberError(pub String);

/// Parse a numeric cell as people type them (`"85%"`, `"1,200"`, `"10_000"`).
///
/// Empty cells are `Ok(None)` so callers can tell "no value" from "garbage".
pub fn parse_number(cell: &str) -> Result<Option<f64>, ParseNumberError> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| !matches!(c, '%' | ',' | '_'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ParseNumberError(cell.to_string()))
}

/// Normalize a numeric cell for display: whole numbers lose their decimals,
/// others keep two. Non-numeric text is passed through; empty is `None`.
pub fn display_number(cell: &str) -> Option<String> {
    if is_blank(cell) {
        return None;
    }
    Some(match parse_number(cell) {
        Ok(Some(v)) if v.fract() == 0.0 => format!("{v:.0}"),
        Ok(Some(v)) => format!("{v:.2}"),
        _ => cell.trim().to_string(),
    })
}

/// Whether `actual` misses `target`. A non-numeric value on a numeric KPI
/// counts as a miss; an empty one counts as zero.
pub fn is_off_target(kind: KpiKind, actual: &str, target: &str) -> bool {
    if kind == KpiKind::Text {
        return actual.trim().to_lowercase() != target.trim().to_lowercase();
    }
    let (Ok(actual), Ok(target)) = (parse_number(actual), parse_number(target)) else {
        return true;
    };
    let (actual, target) = (actual.unwrap_or(0.0), target.unwrap_or(0.0));
    match kind {
        KpiKind::LowerThan => actual > target,
        _ => actual < target,
    }
}

/// Achievement ratio used to rank KPIs: 1.0 means exactly on target.
///
/// Unparseable or missing values score 0.0, which excludes them from rankings.
pub fn score(kind: KpiKind, actual: &str, target: &str) -> f64 {
    let (Ok(Some(actual)), Ok(Some(target))) = (parse_number(actual), parse_number(target)) else {
        return 0.0;
    };
    if target == 0.0 {
        // A zero target cannot be divided by; judge it on target-or-not.
        let off = match kind {
            KpiKind::LowerThan => actual > target,
            _ => actual < target,
        };
        return if off { 0.0 } else { 1.0 };
    }
    match kind {
        KpiKind::LowerThan if actual > 0.0 => target / actual,
        KpiKind::LowerThan => 0.0,
        _ => actual / target,
    }
}
