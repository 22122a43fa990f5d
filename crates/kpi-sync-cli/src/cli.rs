use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kpi_sync::{
    spawn_refresher, DeferReason, DirRemoteStore, EditPayload, EvaluationPeriod, HttpRemoteStore, KpiService, Month,
    RefreshReport, RemoteStore, SaveOutcome, SummaryFilter, SyncCache, SyncConfig,
};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "kpi-sync", about = "Inspect and operate the KPI dashboard sync cache.")]
pub struct Args {
    /// Location of the KPI workbook: an http(s) URL, or a path to a JSON
    /// document in a mounted document library.
    #[arg(long, value_name = "URL|PATH")]
    remote: String,

    /// Read a bearer token for the remote from a file (trailing newlines are trimmed).
    #[arg(long, value_name = "PATH")]
    token_file: Option<PathBuf>,

    /// JSON config file. Environment variables override it; flags override both.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the pending queue and the local table copy.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Snapshot time-to-live in seconds.
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Evaluation month (`Jan`..`Dec` or 1-12). Defaults to last month.
    #[arg(long)]
    month: Option<Month>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List sectors present in the workbook.
    Sectors,
    /// Show evaluation-month KPIs for a sector.
    Current { sector: String },
    /// Show the full year for a sector.
    Historic { sector: String },
    /// Dashboard figures for one month, across all sectors unless `--sector` is given.
    Summary {
        #[arg(long)]
        sector: Option<String>,
    },
    /// List edits not yet confirmed by the remote.
    Pending,
    /// Fetch the remote now and reconcile queued edits.
    Refresh,
    /// Submit an evaluation-month result.
    Save {
        sector: String,
        id: String,
        achieved: String,
        #[arg(long)]
        justification: Option<String>,
        #[arg(long)]
        countermeasure: Option<String>,
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Keep the cache fresh in the background until interrupted.
    Serve {
        /// Refresh interval in seconds (defaults to the configured interval).
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl Args {
    fn sync_config(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::load(self.config.as_deref()).context("loading configuration")?;
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(ttl) = self.ttl_secs {
            config.ttl_secs = ttl;
        }
        Ok(config)
    }

    fn remote_store(&self, config: &SyncConfig) -> Result<Arc<dyn RemoteStore>> {
        let location = self.remote.trim();
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Ok(Arc::new(DirRemoteStore::new(location)));
        }
        let mut store = HttpRemoteStore::new(location, config.remote_timeout())?;
        if let Some(path) = &self.token_file {
            let token = std::fs::read_to_string(path)
                .with_context(|| format!("reading token file {}", path.display()))?;
            store = store.with_bearer_token(token.trim_end_matches(['\r', '\n']));
        }
        Ok(Arc::new(store))
    }
}

pub async fn run(args: Args) -> Result<()> {
    let config = args.sync_config()?;
    let remote = args.remote_store(&config)?;
    tracing::debug!(remote = %remote.describe(), cache_dir = %config.cache_dir.display(), "opening sync cache");

    let cache = Arc::new(SyncCache::open(remote, &config).context("opening sync cache")?);
    let mut service = KpiService::new(Arc::clone(&cache));
    if let Some(month) = args.month {
        service = service.with_period(EvaluationPeriod::of(month));
    }

    match &args.command {
        Command::Sectors => {
            let sectors = service.list_sectors().await;
            emit(&args.format, &sectors, || sectors.join("\n"))
        }
        Command::Current { sector } => {
            let records = service.load_current(sector).await;
            emit(&args.format, &records, || {
                records
                    .iter()
                    .map(|r| {
                        let lock = if r.submitted { "submitted" } else { "open" };
                        format!(
                            "{:>4}  {:<40}  target {:>8}  achieved {:>8}  [{lock}]",
                            r.id, r.name, r.target, r.achieved
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Historic { sector } => {
            let records = service.load_historic(sector).await;
            emit(&args.format, &records, || {
                records
                    .iter()
                    .map(|r| {
                        let months: Vec<String> = r
                            .months
                            .iter()
                            .map(|m| format!("{}={}", m.month, m.actual.as_deref().unwrap_or("-")))
                            .collect();
                        let ytd = r.year_to_date.map_or("-".to_string(), |v| format!("{v}"));
                        format!("{:>4}  {:<40}  ytd {ytd}  {}", r.id, r.name, months.join(" "))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Command::Summary { sector } => {
            let month = service.period().current;
            let filter = match sector {
                Some(sector) => SummaryFilter::Sector(sector.clone()),
                None => SummaryFilter::AllSectors,
            };
            let Some(summary) = service.executive_summary(month, &filter).await else {
                anyhow::bail!("no KPIs for {filter:?}");
            };
            emit(&args.format, &summary, || {
                let ranked = |list: &[kpi_sync::RankedKpi]| {
                    list.iter()
                        .map(|k| format!("    {:<40} {:>6.1}%", k.name, k.score * 100.0))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                format!(
                    "{month}: {} KPIs, {} on target ({:.1}%), {} need action\n  top:\n{}\n  bottom:\n{}",
                    summary.total,
                    summary.on_target,
                    summary.percent_on_target,
                    summary.needs_action,
                    ranked(&summary.top),
                    ranked(&summary.bottom)
                )
            })
        }
        Command::Pending => {
            let edits = service.pending_edits().await;
            emit(&args.format, &edits, || {
                let mut lines: Vec<String> = edits
                    .iter()
                    .map(|e| format!("{}  achieved={}  queued {}", e.key(), e.payload.achieved, e.recorded_at))
                    .collect();
                lines.push(format!("{} pending", edits.len()));
                lines.join("\n")
            })
        }
        Command::Refresh => {
            let report = RefreshSummary::from(&service.force_refresh().await);
            emit(&args.format, &report, || report.to_string())
        }
        Command::Save {
            sector,
            id,
            achieved,
            justification,
            countermeasure,
            due,
            owner,
        } => {
            let mut payload = EditPayload::achieved(achieved.as_str());
            if let Some(justification) = justification {
                payload = payload.with_justification(
                    justification.as_str(),
                    countermeasure.clone().unwrap_or_default(),
                    due.clone().unwrap_or_default(),
                    owner.clone().unwrap_or_default(),
                );
            }
            let outcome = service.save(sector, id, payload).await.context("saving result")?;
            let report = SaveSummary::from(&outcome);
            emit(&args.format, &report, || match &report.deferred {
                None if report.resolved_by_remote => "not saved: the workbook already holds a value".to_string(),
                None => "saved and uploaded".to_string(),
                Some(reason) => format!("saved locally, upload deferred: {reason}"),
            })
        }
        Command::Serve { interval_secs } => {
            let every = interval_secs.map_or(config.refresh_interval(), Duration::from_secs);
            anyhow::ensure!(!every.is_zero(), "refresh interval must be greater than zero");
            let initial = cache.get_snapshot(false).await;
            tracing::info!(source = ?initial.source, rows = initial.table.row_count(), "initial snapshot loaded");

            let handle = spawn_refresher(Arc::clone(&cache), every);
            wait_for_shutdown_signal().await;
            tracing::info!("shutting down");
            handle.shutdown().await;
            Ok(())
        }
    }
}

fn emit<T: Serialize + ?Sized>(format: &OutputFormat, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => writeln!(handle, "{}", text())?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut handle, value)?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct RefreshSummary {
    source: kpi_sync::SnapshotSource,
    fetched_at: String,
    rows: usize,
    applied: usize,
    resolved_by_remote: usize,
    orphaned: usize,
    deferred: usize,
    fetch_error: Option<String>,
    local_copy_persisted: bool,
}

impl From<&RefreshReport> for RefreshSummary {
    fn from(report: &RefreshReport) -> Self {
        Self {
            source: report.source(),
            fetched_at: report.snapshot.fetched_at.to_rfc3339(),
            rows: report.snapshot.table.row_count(),
            applied: report.reconcile.applied.len(),
            resolved_by_remote: report.reconcile.resolved_by_remote.len(),
            orphaned: report.reconcile.orphaned.len(),
            deferred: report.reconcile.deferred.len(),
            fetch_error: report.fetch_error.as_ref().map(ToString::to_string),
            local_copy_persisted: report.local_copy_persisted,
        }
    }
}

impl std::fmt::Display for RefreshSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "source: {:?} ({} rows, fetched {})", self.source, self.rows, self.fetched_at)?;
        if let Some(err) = &self.fetch_error {
            writeln!(f, "fetch error: {err}")?;
        }
        write!(
            f,
            "queued edits: {} applied, {} resolved by remote, {} orphaned, {} deferred",
            self.applied, self.resolved_by_remote, self.orphaned, self.deferred
        )?;
        if !self.local_copy_persisted {
            write!(f, "\nwarning: local copy could not be written")?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SaveSummary {
    synced: bool,
    resolved_by_remote: bool,
    deferred: Option<String>,
}

impl From<&SaveOutcome> for SaveSummary {
    fn from(outcome: &SaveOutcome) -> Self {
        let deferred = match outcome {
            SaveOutcome::Synced | SaveOutcome::ResolvedByRemote => None,
            SaveOutcome::Deferred(DeferReason::RecordNotFound) => Some("no matching row in the workbook".to_string()),
            SaveOutcome::Deferred(DeferReason::RemoteUnavailable) => Some("remote unavailable".to_string()),
            SaveOutcome::Deferred(DeferReason::UploadFailed { attempts, last_error }) => {
                Some(format!("upload failed after {attempts} attempt(s): {last_error}"))
            }
        };
        let resolved_by_remote = *outcome == SaveOutcome::ResolvedByRemote;
        Self {
            synced: deferred.is_none() && !resolved_by_remote,
            resolved_by_remote,
            deferred,
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_sync::RemoteError;
    use pretty_assertions::assert_eq;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).expect("valid arguments")
    }

    #[test]
    fn save_accepts_justification_fields() {
        let args = parse(&[
            "kpi-sync",
            "--remote",
            "/mnt/library/KPISystem.json",
            "--month",
            "feb",
            "save",
            "Finance",
            "1",
            "70",
            "--justification",
            "late invoices",
            "--owner",
            "Ana",
        ]);
        assert_eq!(args.month, Some(Month::Feb));
        let Command::Save {
            sector,
            id,
            achieved,
            justification,
            owner,
            due,
            ..
        } = args.command
        else {
            panic!("expected save, got {:?}", args.command);
        };
        assert_eq!((sector.as_str(), id.as_str(), achieved.as_str()), ("Finance", "1", "70"));
        assert_eq!(justification.as_deref(), Some("late invoices"));
        assert_eq!(owner.as_deref(), Some("Ana"));
        assert_eq!(due, None);
    }

    #[test]
    fn remote_is_required_and_month_is_validated() {
        assert!(Args::try_parse_from(["kpi-sync", "sectors"]).is_err());
        assert!(Args::try_parse_from(["kpi-sync", "--remote", "x.json", "--month", "13", "sectors"]).is_err());
    }

    #[test]
    fn flags_override_configured_values() {
        let args = parse(&[
            "kpi-sync",
            "--remote",
            "x.json",
            "--cache-dir",
            "/tmp/kpi-cache",
            "--ttl-secs",
            "60",
            "pending",
        ]);
        let config = args.sync_config().expect("config");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/kpi-cache"));
        assert_eq!(config.ttl_secs, 60);
    }

    #[test]
    fn deferred_saves_explain_why() {
        let outcome = SaveOutcome::Deferred(DeferReason::UploadFailed {
            attempts: 3,
            last_error: RemoteError::Locked("checked out".into()),
        });
        let summary = SaveSummary::from(&outcome);
        assert!(!summary.synced);
        assert_eq!(
            summary.deferred.as_deref(),
            Some("upload failed after 3 attempt(s): remote document locked: checked out")
        );
        assert!(SaveSummary::from(&SaveOutcome::Synced).synced);

        let dropped = SaveSummary::from(&SaveOutcome::ResolvedByRemote);
        assert!(!dropped.synced);
        assert!(dropped.resolved_by_remote);
        assert_eq!(dropped.deferred, None);
    }
}
