use std::sync::Arc;

use crate::cache::{RefreshReport, SaveOutcome, SyncCache};
use crate::error::Result;
use crate::period::{EvaluationPeriod, Month};
use crate::queue::{EditPayload, PendingEdit};
use crate::summary::{summarize, ExecutiveSummary, SummaryFilter};
use crate::view::{current_records, historic_records, HistoricKpi, KpiRecord};

/// The read/write surface used by dashboard front ends.
///
/// Every read is answered from the cache's current snapshot (refreshing it if
/// stale). Writes always target the evaluation month; earlier months are
/// read-only.
#[derive(Clone)]
pub struct KpiService {
    cache: Arc<SyncCache>,
    period: Option<EvaluationPeriod>,
}

impl KpiService {
    pub fn new(cache: Arc<SyncCache>) -> Self {
        Self { cache, period: None }
    }

    /// Pin the evaluation period instead of deriving it from today's date.
    pub fn with_period(mut self, period: EvaluationPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn cache(&self) -> &Arc<SyncCache> {
        &self.cache
    }

    pub fn period(&self) -> EvaluationPeriod {
        self.period.unwrap_or_else(EvaluationPeriod::today)
    }

    pub async fn list_sectors(&self) -> Vec<String> {
        let snapshot = self.cache.get_snapshot(false).await;
        snapshot.table.distinct_values(&self.cache.layout().sector)
    }

    pub async fn load_current(&self, sector: &str) -> Vec<KpiRecord> {
        let snapshot = self.cache.get_snapshot(false).await;
        current_records(&snapshot.table, self.cache.layout(), sector, self.period())
    }

    pub async fn load_historic(&self, sector: &str) -> Vec<HistoricKpi> {
        let snapshot = self.cache.get_snapshot(false).await;
        historic_records(&snapshot.table, self.cache.layout(), sector)
    }

    /// Dashboard figures for `month` across one or all sectors. `None` when
    /// the selection has no KPIs.
    pub async fn executive_summary(&self, month: Month, filter: &SummaryFilter) -> Option<ExecutiveSummary> {
        let snapshot = self.cache.get_snapshot(false).await;
        let layout = self.cache.layout();
        let kpis: Vec<HistoricKpi> = match filter {
            SummaryFilter::Sector(sector) => historic_records(&snapshot.table, layout, sector),
            SummaryFilter::AllSectors => snapshot
                .table
                .distinct_values(&layout.sector)
                .iter()
                .flat_map(|sector| historic_records(&snapshot.table, layout, sector))
                .collect(),
        };
        summarize(month, &kpis)
    }

    /// Submit the evaluation-month result for one KPI.
    pub async fn save(&self, sector: &str, record_key: &str, payload: EditPayload) -> Result<SaveOutcome> {
        let period = self.period().current;
        let mut edit = PendingEdit::new(sector.trim(), record_key.trim(), period, payload);
        if let Some(name) = self.record_name(sector, record_key) {
            edit = edit.with_record_name(name);
        }
        tracing::info!(sector = %edit.sector, record_key = %edit.record_key, period = %period, "saving KPI result");
        self.cache.save(edit).await
    }

    fn record_name(&self, sector: &str, record_key: &str) -> Option<String> {
        let snapshot = self.cache.published()?;
        let layout = self.cache.layout();
        let row = snapshot.table.find_row(&layout.sector, sector, &layout.id, record_key)?;
        Some(snapshot.table.text(row, &layout.name).trim().to_string()).filter(|n| !n.is_empty())
    }

    pub async fn force_refresh(&self) -> RefreshReport {
        self.cache.force_refresh().await
    }

    pub async fn pending_count(&self) -> usize {
        self.cache.pending_count().await
    }

    pub async fn pending_edits(&self) -> Vec<PendingEdit> {
        self.cache.pending_edits().await
    }
}
