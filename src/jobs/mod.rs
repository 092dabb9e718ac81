//! The synchronization steps and the fast path that composes some of them.
//!
//! A full sync is driven from outside: every step invocation authenticates, fetches one upstream
//! dataset, writes it and returns a hint naming the next call. The order is
//! `0 → 1 → 2 (x22) → 2b (x22) → 3 (x7) → 4`.

pub mod breakdown_sync;
pub mod derived_pass;
pub mod equipment_sync;
pub mod fast_path;
pub mod fast_path_job;
pub mod flags;
pub mod planning_type_sync;
pub mod stoppage_sync;
pub mod visit_dates_sync;

use std::fmt;

use crate::models::sync::StepReport;
use crate::services::progilift::{SessionToken, Upstream};
use crate::services::record_store::{RecordStore, Row};

/// Technician sector codes the equipment queries are paged by
pub const SECTORS: [&str; 22] = [
    "1", "2", "3", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "17", "18", "19",
    "20", "71", "72", "73", "74",
];

/// Breakdown cutoffs, newest first
pub const PERIODS: [&str; 7] = [
    "2025-10-01T00:00:00",
    "2025-07-01T00:00:00",
    "2025-01-01T00:00:00",
    "2024-01-01T00:00:00",
    "2023-01-01T00:00:00",
    "2022-01-01T00:00:00",
    "2020-01-01T00:00:00",
];

/// Bulk write sizes accepted by the store
pub mod chunks {
    pub const FULL_SYNC: usize = 100;
    pub const SMALL: usize = 50;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    PlanningTypes,
    Stoppages,
    Equipment { sector: usize },
    VisitDates { sector: usize },
    Breakdowns { period: usize },
    Derived,
}

impl Step {
    pub const FIRST: Step = Step::PlanningTypes;

    /// Resolve the `step` query value; sector and period only matter for the paged steps.
    pub fn from_query(step: &str, sector: usize, period: usize) -> Option<Self> {
        match step {
            "0" => Some(Self::PlanningTypes),
            "1" => Some(Self::Stoppages),
            "2" => Some(Self::Equipment { sector }),
            "2b" => Some(Self::VisitDates { sector }),
            "3" => Some(Self::Breakdowns { period }),
            "4" => Some(Self::Derived),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::PlanningTypes => "0",
            Self::Stoppages => "1",
            Self::Equipment { .. } => "2",
            Self::VisitDates { .. } => "2b",
            Self::Breakdowns { .. } => "3",
            Self::Derived => "4",
        }
    }

    /// The call that follows this one, `None` after the derived pass. An index past the end of
    /// its list moves on to the next phase.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::PlanningTypes => Some(Self::Stoppages),
            Self::Stoppages => Some(Self::Equipment { sector: 0 }),
            Self::Equipment { sector } if sector + 1 < SECTORS.len() => {
                Some(Self::Equipment { sector: sector + 1 })
            }
            Self::Equipment { .. } => Some(Self::VisitDates { sector: 0 }),
            Self::VisitDates { sector } if sector + 1 < SECTORS.len() => {
                Some(Self::VisitDates { sector: sector + 1 })
            }
            Self::VisitDates { .. } => Some(Self::Breakdowns { period: 0 }),
            Self::Breakdowns { period } if period + 1 < PERIODS.len() => {
                Some(Self::Breakdowns { period: period + 1 })
            }
            Self::Breakdowns { .. } => Some(Self::Derived),
            Self::Derived => None,
        }
    }

    /// Query string that triggers this step, e.g. `?step=2&sector=3`.
    pub fn hint(self) -> String {
        self.to_string()
    }

    pub fn next_hint(self) -> Option<String> {
        self.next().map(Step::hint)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equipment { sector } | Self::VisitDates { sector } => {
                write!(f, "?step={}&sector={}", self.id(), sector)
            }
            Self::Breakdowns { period } => write!(f, "?step={}&period={}", self.id(), period),
            _ => write!(f, "?step={}", self.id()),
        }
    }
}

/// Run a single step to completion. Never fails: every error ends up in the report.
pub async fn run_step(upstream: &dyn Upstream, store: &dyn RecordStore, step: Step) -> StepReport {
    tracing::info!("Running sync step {}", step.hint());

    let report = match step {
        Step::PlanningTypes => planning_type_sync::sync_planning_types(upstream, store).await,
        Step::Stoppages => stoppage_sync::sync_stoppages(upstream, store).await,
        Step::Equipment { sector } => equipment_sync::sync_equipment(upstream, store, sector).await,
        Step::VisitDates { sector } => {
            visit_dates_sync::sync_visit_dates(upstream, store, sector).await
        }
        Step::Breakdowns { period } => {
            breakdown_sync::sync_breakdowns(upstream, store, period).await
        }
        Step::Derived => derived_pass::run_derived_pass(store).await,
    };

    tracing::info!(
        "Step {} finished: {:?} (found {}, written {}, skipped {}, failed {})",
        step.hint(),
        report.status,
        report.found,
        report.written,
        report.skipped,
        report.failed
    );
    report
}

/// Session for one step, or the error report that step should return.
pub(crate) async fn open_session(
    upstream: &dyn Upstream,
    step: Step,
) -> Result<SessionToken, StepReport> {
    upstream.authenticate().await.map_err(|e| {
        tracing::error!("[step {}] {}", step.id(), e);
        StepReport::error(step.id(), "Auth failed")
    })
}

#[derive(Clone, Copy)]
pub(crate) enum WriteMode<'a> {
    Insert,
    Upsert { on_conflict: &'a str },
}

/// Write `rows` in chunks; a rejected chunk is recorded on the report and the rest still go out.
pub(crate) async fn write_batches(
    store: &dyn RecordStore,
    table: &str,
    rows: &[Row],
    chunk_size: usize,
    mode: WriteMode<'_>,
    report: &mut StepReport,
) {
    for (i, chunk) in rows.chunks(chunk_size).enumerate() {
        let result = match mode {
            WriteMode::Insert => store.insert(table, chunk).await,
            WriteMode::Upsert { on_conflict } => store.upsert(table, chunk, on_conflict).await,
        };
        match result {
            Ok(()) => report.written += chunk.len(),
            Err(e) => {
                tracing::warn!("Batch {} of {} rows to {} failed: {}", i, chunk.len(), table, e);
                report.record_failure(chunk.len(), format!("Batch {}: {}", i, e));
            }
        }
    }
}
