use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar month; also the period identifier carried by queued edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// 1-based month number.
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(number: u32) -> Option<Month> {
        let idx = usize::try_from(number.checked_sub(1)?).ok()?;
        Month::ALL.get(idx).copied()
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    pub fn pred(self) -> Month {
        match self {
            Month::Jan => Month::Dec,
            other => Month::ALL[other as usize - 1],
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown month: {0:?}")]
pub struct ParseMonthError(String);

impl FromStr for Month {
    type Err = ParseMonthError;

    /// Accepts the suffix (`"Jan"`, case-insensitive) or the month number (`"1"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<u32>() {
            return Month::from_number(number).ok_or_else(|| ParseMonthError(s.to_string()));
        }
        Month::ALL
            .into_iter()
            .find(|m| m.suffix().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseMonthError(s.to_string()))
    }
}

/// The month whose results are being collected, and the month before it.
///
/// Results are always entered for the last completed month: on any day in
/// March the evaluation month is February and the previous month is January.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationPeriod {
    pub current: Month,
    pub previous: Month,
}

impl EvaluationPeriod {
    pub fn for_date(date: NaiveDate) -> Self {
        let today = Month::from_number(date.month()).unwrap_or(Month::Jan);
        let current = today.pred();
        Self {
            current,
            previous: current.pred(),
        }
    }

    pub fn today() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    /// Evaluate a fixed month (e.g. for back-filling or tests).
    pub fn of(current: Month) -> Self {
        Self {
            current,
            previous: current.pred(),
        }
    }
}
