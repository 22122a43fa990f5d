//! Synchronization core of the KPI dashboard.
//!
//! The authoritative KPI table lives in a remote document ([`RemoteStore`]).
//! [`SyncCache`] keeps a time-bounded copy of it in memory, records every
//! submitted result in a durable [`PendingWriteQueue`] before trying to upload,
//! and reconciles queued edits into each freshly fetched table
//! ([`reconcile::reconcile`]). [`KpiService`] is the surface front ends call.
//!
//! Failure handling in one line: remote problems degrade to the local copy
//! and a queued edit; only a failed local write is reported as an error.

mod durable;

pub mod cache;
pub mod config;
pub mod error;
pub mod kpi;
pub mod layout;
pub mod period;
pub mod queue;
pub mod reconcile;
pub mod refresher;
pub mod remote;
pub mod retry;
pub mod service;
pub mod summary;
pub mod table;
pub mod view;

pub use cache::{
    CacheState, DeferReason, FlushOutcome, RefreshReport, SaveOutcome, Snapshot, SnapshotSource, SyncCache,
};
pub use config::{ConfigError, SyncConfig};
pub use error::{RemoteError, Result, SyncError};
pub use kpi::{KpiKind, ParseNumberError};
pub use layout::SheetLayout;
pub use period::{EvaluationPeriod, Month};
pub use queue::{EditKey, EditPayload, PendingEdit, PendingWriteQueue};
pub use reconcile::ReconcileReport;
pub use refresher::{spawn_refresher, RefresherHandle};
pub use remote::{DirRemoteStore, HttpRemoteStore, InMemoryRemoteStore, RemoteStore};
pub use retry::{RetryExhausted, RetryPolicy};
pub use service::KpiService;
pub use summary::{ExecutiveSummary, RankedKpi, SummaryFilter};
pub use table::Table;
pub use view::{HistoricKpi, KpiRecord, MonthCell};
