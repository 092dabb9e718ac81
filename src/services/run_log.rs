//! Append-only run log in `parc_sync_logs`.
//!
//! Each fast-path run and each completed full sync leaves one row here; the dashboard reads them
//! back through the logs and status endpoints.

use serde_json::Value;

use crate::error::{Result, truncate};
use crate::models::status::{LogStats, RunsByKind};
use crate::models::sync_log::{MAX_ERROR_LEN, RunKind, RunOutcome, SyncLogEntry};
use crate::services::record_store::{Filter, RecordStore, Row, SelectQuery, tables, to_row};

/// Number of runs the aggregate statistics are computed over
pub const STATS_WINDOW: usize = 100;

/// Append one entry. The error text is cut to `MAX_ERROR_LEN` characters.
pub async fn record_run(store: &dyn RecordStore, mut entry: SyncLogEntry) -> Result<()> {
    entry.error = entry
        .error
        .filter(|e| !e.is_empty())
        .map(|e| truncate(&e, MAX_ERROR_LEN));

    store.insert(tables::SYNC_LOGS, &[to_row(&entry)]).await?;

    tracing::debug!(
        "[{}] Recorded {} run ({:.2}s)",
        entry.sync_type.as_str(),
        entry.status.as_str(),
        entry.duration_seconds
    );
    Ok(())
}

/// Most recent runs first, optionally filtered by kind and outcome.
pub async fn recent_runs(
    store: &dyn RecordStore,
    limit: usize,
    kind: Option<&str>,
    status: Option<&str>,
) -> Result<Vec<Row>> {
    let mut query = SelectQuery::new(tables::SYNC_LOGS)
        .order_desc("sync_date")
        .limit(limit);
    if let Some(kind) = kind {
        query = query.filter(Filter::eq("sync_type", kind));
    }
    if let Some(status) = status {
        query = query.filter(Filter::eq("status", status));
    }
    store.select(&query).await
}

pub async fn last_run(store: &dyn RecordStore) -> Result<Option<Row>> {
    Ok(recent_runs(store, 1, None, None).await?.into_iter().next())
}

pub fn compute_stats(runs: &[Row]) -> LogStats {
    let total = runs.len();
    if total == 0 {
        return LogStats::default();
    }

    let field = |row: &Row, name: &str| row.get(name).and_then(Value::as_str).map(str::to_string);
    let count_status = |outcome: RunOutcome| {
        runs.iter()
            .filter(|r| field(r, "status").as_deref() == Some(outcome.as_str()))
            .count()
    };
    let count_kind = |kind: RunKind| {
        runs.iter()
            .filter(|r| field(r, "sync_type").as_deref() == Some(kind.as_str()))
            .count()
    };

    let success = count_status(RunOutcome::Success);
    let cron = count_kind(RunKind::Cron);
    let full = count_kind(RunKind::Full);

    let durations: Vec<f64> = runs
        .iter()
        .filter_map(|r| r.get("duration_seconds").and_then(Value::as_f64))
        .filter(|d| *d > 0.0)
        .collect();
    let avg_duration = if durations.is_empty() {
        0.0
    } else {
        round_to(durations.iter().sum::<f64>() / durations.len() as f64, 2)
    };

    LogStats {
        total_syncs: total,
        success,
        partial: count_status(RunOutcome::Partial),
        errors: count_status(RunOutcome::Error),
        success_rate: round_to(success as f64 / total as f64 * 100.0, 1),
        by_type: RunsByKind {
            cron,
            full,
            other: total - cron - full,
        },
        avg_duration_seconds: avg_duration,
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
