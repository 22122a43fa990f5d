//! Executive summary over the historic view.

use serde::Serialize;

use crate::kpi::{is_off_target, score};
use crate::period::Month;
use crate::view::HistoricKpi;

const RANKED: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryFilter {
    AllSectors,
    Sector(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedKpi {
    pub sector: String,
    pub name: String,
    pub score: f64,
    pub on_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutiveSummary {
    pub month: Month,
    /// KPIs with both a target and a result for the month.
    pub total: usize,
    pub on_target: usize,
    pub needs_action: usize,
    /// 0.0 to 100.0.
    pub percent_on_target: f64,
    pub top: Vec<RankedKpi>,
    pub bottom: Vec<RankedKpi>,
}

/// Summarize `kpis` for `month`. `None` when there are no KPIs at all.
///
/// Zero scores (unparseable values, or nothing achieved on a lower-is-better
/// KPI) are counted but not ranked. When nothing reaches its target and there
/// are more than three ranked KPIs, `bottom` lists all of them.
pub fn summarize(month: Month, kpis: &[HistoricKpi]) -> Option<ExecutiveSummary> {
    if kpis.is_empty() {
        return None;
    }

    let mut total = 0;
    let mut on_target = 0;
    let mut ranked = Vec::new();
    for kpi in kpis {
        let cell = kpi.month(month);
        let (Some(actual), Some(target)) = (cell.actual.as_deref(), cell.target.as_deref()) else {
            continue;
        };
        total += 1;
        let hit = !is_off_target(kpi.kind, actual, target);
        if hit {
            on_target += 1;
        }
        let ratio = score(kpi.kind, actual, target);
        if ratio != 0.0 {
            ranked.push(RankedKpi {
                sector: kpi.sector.clone(),
                name: kpi.name.clone(),
                score: ratio,
                on_target: hit,
            });
        }
    }

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    let top: Vec<RankedKpi> = ranked.iter().take(RANKED).cloned().collect();
    let bottom = if ranked.len() > RANKED && ranked[0].score < 1.0 {
        ranked
    } else {
        let skip = ranked.len().saturating_sub(RANKED);
        ranked.split_off(skip)
    };

    let percent_on_target = if total == 0 {
        0.0
    } else {
        on_target as f64 / total as f64 * 100.0
    };

    Some(ExecutiveSummary {
        month,
        total,
        on_target,
        needs_action: total - on_target,
        percent_on_target,
        top,
        bottom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::KpiKind;
    use crate::view::MonthCell;

    fn kpi(name: &str, kind: KpiKind, actual: Option<&str>, target: Option<&str>) -> HistoricKpi {
        HistoricKpi {
            sector: "Finance".into(),
            id: name.into(),
            name: name.into(),
            kind,
            unit: None,
            annual_result: None,
            basic_target: None,
            challenge_target: None,
            months: Month::ALL
                .into_iter()
                .map(|month| MonthCell {
                    month,
                    target: target.map(str::to_string),
                    actual: actual.map(str::to_string),
                })
                .collect(),
            year_to_date: None,
        }
    }

    fn names(ranked: &[RankedKpi]) -> Vec<&str> {
        ranked.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn no_kpis_means_no_summary() {
        assert_eq!(summarize(Month::Jan, &[]), None);
    }

    #[test]
    fn counts_only_kpis_with_target_and_result() {
        let kpis = vec![
            kpi("a", KpiKind::GreaterThan, Some("95"), Some("90")),
            kpi("b", KpiKind::LowerThan, Some("4"), Some("2")),
            kpi("c", KpiKind::GreaterThan, None, Some("90")),
            kpi("d", KpiKind::Text, Some("OK"), Some("ok")),
        ];
        let summary = summarize(Month::Mar, &kpis).expect("summary");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.on_target, 2);
        assert_eq!(summary.needs_action, 1);
        assert!((summary.percent_on_target - 66.666).abs() < 0.01);
        // The text KPI scores zero and is not ranked.
        assert_eq!(names(&summary.top), vec!["a", "b"]);
        assert_eq!(names(&summary.bottom), vec!["a", "b"]);
    }

    #[test]
    fn bottom_lists_everything_when_nothing_is_on_target() {
        let kpis = vec![
            kpi("a", KpiKind::GreaterThan, Some("80"), Some("100")),
            kpi("b", KpiKind::GreaterThan, Some("70"), Some("100")),
            kpi("c", KpiKind::GreaterThan, Some("60"), Some("100")),
            kpi("d", KpiKind::GreaterThan, Some("50"), Some("100")),
        ];
        let summary = summarize(Month::Jan, &kpis).expect("summary");
        assert_eq!(names(&summary.top), vec!["a", "b", "c"]);
        assert_eq!(names(&summary.bottom), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn bottom_is_the_three_lowest_otherwise() {
        let kpis = vec![
            kpi("a", KpiKind::GreaterThan, Some("120"), Some("100")),
            kpi("b", KpiKind::GreaterThan, Some("70"), Some("100")),
            kpi("c", KpiKind::GreaterThan, Some("60"), Some("100")),
            kpi("d", KpiKind::GreaterThan, Some("50"), Some("100")),
        ];
        let summary = summarize(Month::Jan, &kpis).expect("summary");
        assert_eq!(names(&summary.bottom), vec!["b", "c", "d"]);
        assert_eq!(summary.on_target, 1);
    }
}
