//! Frequent low-latency run: stoppages, the most recent breakdowns and stopped flags.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{Duration, Utc};

use crate::error::truncate;
use crate::jobs::breakdown_sync::{self, BreakdownFetch};
use crate::jobs::flags::{self, FlagReconciliation};
use crate::jobs::{PERIODS, chunks, stoppage_sync};
use crate::models::breakdown::BreakdownShape;
use crate::models::sync::{FastPathReport, FastPathStats, StepStatus};
use crate::models::sync_log::{MAX_ERROR_LEN, RunKind, RunOutcome, SyncLogEntry};
use crate::services::progilift::{Upstream, timeouts};
use crate::services::record_store::RecordStore;
use crate::services::run_log;

#[derive(Debug, Clone, Copy, Default)]
pub struct FastPathOptions {
    /// Fetch breakdowns changed in the last N days instead of since the newest period cutoff.
    pub lookback_days: Option<i64>,
}

impl FastPathOptions {
    fn breakdown_cutoff(&self) -> String {
        match self.lookback_days {
            Some(days) => (Utc::now() - Duration::days(days))
                .format("%Y-%m-%dT00:00:00")
                .to_string(),
            None => PERIODS[0].to_string(),
        }
    }
}

/// Run the fast path once. A run log row is appended whatever happens.
///
/// Flags are only raised for the stoppages fetched in this run; equipment that left the stoppage
/// list keeps its flag until the next derived pass.
pub async fn run_fast_path(
    upstream: &dyn Upstream,
    store: &dyn RecordStore,
    options: &FastPathOptions,
) -> FastPathReport {
    let started = Instant::now();
    let mut stats = FastPathStats::default();

    let outcome = match upstream.authenticate().await {
        Ok(token) => {
            let stoppages = stoppage_sync::replace_stoppages(upstream, store, &token).await;
            stats.stoppages = stoppages.written;
            collect_errors(&mut stats, "Stoppages", stoppages.message.as_deref(), &stoppages.errors);

            let cutoff = options.breakdown_cutoff();
            let breakdowns = breakdown_sync::fetch_and_upsert(
                upstream,
                store,
                &token,
                BreakdownFetch {
                    since: &cutoff,
                    shape: BreakdownShape::FastPath,
                    timeout: timeouts::FAST_PATH_BREAKDOWNS,
                    chunk_size: chunks::SMALL,
                },
            )
            .await;
            stats.breakdowns = breakdowns.written;
            stats.breakdowns_skipped = breakdowns.skipped;
            collect_errors(&mut stats, "Breakdowns", breakdowns.message.as_deref(), &breakdowns.errors);

            // Without a fresh snapshot there is nothing to reconcile against.
            if stoppages.status != StepStatus::Error {
                let stopped: BTreeSet<i64> =
                    stoppages.stopped_ids.unwrap_or_default().into_iter().collect();
                match flags::reconcile_stopped_flags(store, &stopped, FlagReconciliation::SetOnly).await {
                    Ok(flag_outcome) => {
                        stats.flags_set = flag_outcome.changed;
                        for error in flag_outcome.errors {
                            stats.errors.push(format!("Flags: {}", error));
                        }
                    }
                    Err(e) => stats.errors.push(format!("Flags: {}", e)),
                }
            }

            if stats.errors.is_empty() {
                RunOutcome::Success
            } else {
                RunOutcome::Partial
            }
        }
        Err(e) => {
            tracing::error!("Fast path authentication failed: {}", e);
            stats.errors.push(e.to_string());
            RunOutcome::Error
        }
    };

    let duration = run_log::round_to(started.elapsed().as_secs_f64(), 2);
    let entry = SyncLogEntry {
        sync_date: Utc::now(),
        sync_type: RunKind::Cron,
        status: outcome,
        equipment_count: 0,
        breakdown_count: stats.breakdowns as i64,
        stoppage_count: stats.stoppages as i64,
        duration_seconds: duration,
        error: (!stats.errors.is_empty()).then(|| truncate(&stats.errors.join("; "), MAX_ERROR_LEN)),
    };
    if let Err(e) = run_log::record_run(store, entry).await {
        tracing::warn!("Failed to record fast path run: {}", e);
    }

    tracing::info!(
        "Fast path finished: {} in {:.2}s ({} stoppages, {} breakdowns, {} flags set, {} errors)",
        outcome.as_str(),
        duration,
        stats.stoppages,
        stats.breakdowns,
        stats.flags_set,
        stats.errors.len()
    );

    FastPathReport {
        status: match outcome {
            RunOutcome::Success => StepStatus::Success,
            RunOutcome::Partial => StepStatus::Partial,
            RunOutcome::Error => StepStatus::Error,
        },
        mode: RunKind::Cron.as_str().to_string(),
        stats,
        duration,
        timestamp: Utc::now(),
    }
}

fn collect_errors(stats: &mut FastPathStats, label: &str, message: Option<&str>, errors: &[String]) {
    if let Some(message) = message {
        stats.errors.push(format!("{}: {}", label, message));
    }
    for error in errors {
        stats.errors.push(format!("{}: {}", label, error));
    }
}
