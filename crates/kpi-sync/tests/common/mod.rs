#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use kpi_sync::{InMemoryRemoteStore, Month, RemoteStore, SheetLayout, SyncCache, SyncConfig, Table};

pub fn layout() -> SheetLayout {
    SheetLayout::default()
}

/// A small KPI sheet: two Finance KPIs and one Quality KPI, January and
/// February columns only. `finance_jan` is the January result of Finance #1.
pub fn kpi_table(finance_jan: &str) -> Table {
    let layout = layout();
    let columns = vec![
        layout.sector.clone(),
        layout.id.clone(),
        layout.name.clone(),
        layout.kind.clone(),
        layout.target(Month::Jan).to_string(),
        layout.achieved(Month::Jan),
        layout.target(Month::Feb).to_string(),
        layout.achieved(Month::Feb),
    ];
    let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    Table::new(
        columns,
        vec![
            row(&["Finance", "1", "Invoice accuracy", "GREATER THAN", "90", finance_jan, "90", ""]),
            row(&["Finance", "2", "Overdue receivables", "LOWER THAN", "5", "4", "5", ""]),
            row(&["Quality", "1", "Audit result", "TEXT", "PASS", "PASS", "PASS", ""]),
        ],
    )
}

/// Text of `sector`/`id` for `month`'s achieved column, or `None` if the row is missing.
pub fn achieved(table: &Table, sector: &str, id: &str, month: Month) -> Option<String> {
    let layout = layout();
    let row = table.find_row(&layout.sector, sector, &layout.id, id)?;
    Some(table.text(row, &layout.achieved(month)).to_string())
}

pub fn config(dir: &Path) -> SyncConfig {
    SyncConfig {
        cache_dir: dir.to_path_buf(),
        ..SyncConfig::default()
    }
}

pub fn open_cache(remote: &Arc<InMemoryRemoteStore>, config: &SyncConfig) -> Arc<SyncCache> {
    let remote: Arc<dyn RemoteStore> = remote.clone();
    Arc::new(SyncCache::open(remote, config).expect("open cache"))
}

pub fn read_local_copy(cache: &SyncCache) -> Table {
    let bytes = std::fs::read(cache.local_copy_path()).expect("read local copy");
    serde_json::from_slice(&bytes).expect("parse local copy")
}
