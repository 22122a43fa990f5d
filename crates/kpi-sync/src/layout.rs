use serde::{Deserialize, Serialize};

use crate::period::Month;

/// Header names of the KPI workbook.
///
/// Columns are identified by exact header text (after trimming). The defaults
/// match the production workbook; deployments with a differently labelled
/// sheet override individual fields in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    pub sector: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub units: String,
    pub annual_result: String,
    pub basic_target: String,
    pub challenge_target: String,
    /// Target header per month, January first.
    pub month_targets: [String; 12],
    pub achieved_prefix: String,
    pub justification_prefix: String,
    pub countermeasure_prefix: String,
    pub owner_prefix: String,
    pub due_date_prefix: String,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            sector: "Title".to_string(),
            id: "序号 No.".to_string(),
            name: "指标名称 Indicator name".to_string(),
            description: "口径 KPI description".to_string(),
            kind: "Type".to_string(),
            units: "单位 Units".to_string(),
            annual_result: "2024 年度成果  Annual Results 2024".to_string(),
            basic_target: "2025年目标 Basic Target in 2025".to_string(),
            challenge_target: "2025年目标 ChallengeTarget in 2025".to_string(),
            month_targets: [
                "1月 Jan.", "2月 Feb.", "3月 Mar.", "4月 Apr.", "5月 May", "6月 Jun.", "7月 Jul.",
                "8月 Aug.", "9月 Sep.", "10月 Oct.", "11月 Nov.", "12月 Dec.",
            ]
            .map(str::to_string),
            achieved_prefix: "Achieved ".to_string(),
            justification_prefix: "Justification - ".to_string(),
            countermeasure_prefix: "Countermeasure - ".to_string(),
            owner_prefix: "Responsible - ".to_string(),
            due_date_prefix: "Countermeasure Date - ".to_string(),
        }
    }
}

/// The per-month columns that a submission may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodColumns {
    pub achieved: String,
    pub justification: String,
    pub countermeasure: String,
    pub owner: String,
    pub due_date: String,
}

impl SheetLayout {
    pub fn target(&self, month: Month) -> &str {
        &self.month_targets[month as usize]
    }

    pub fn achieved(&self, month: Month) -> String {
        format!("{}{}", self.achieved_prefix, month.suffix())
    }

    pub fn period_columns(&self, month: Month) -> PeriodColumns {
        let suffix = month.suffix();
        PeriodColumns {
            achieved: self.achieved(month),
            justification: format!("{}{suffix}", self.justification_prefix),
            countermeasure: format!("{}{suffix}", self.countermeasure_prefix),
            owner: format!("{}{suffix}", self.owner_prefix),
            due_date: format!("{}{suffix}", self.due_date_prefix),
        }
    }
}
