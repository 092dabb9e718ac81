use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;

use crate::jobs::{PERIODS, Step, WriteMode, chunks, open_session, write_batches};
use crate::models::breakdown::{self, BreakdownRow, BreakdownShape};
use crate::models::sync::{StepReport, StepStatus};
use crate::parsers::xml;
use crate::services::progilift::{SessionToken, Upstream, methods, timeouts};
use crate::services::record_store::{RecordStore, Row, tables, to_row};

const RECORD_TAG: &str = "tabListeWpanne";

/// How one breakdown fetch is read and written
#[derive(Debug, Clone, Copy)]
pub struct BreakdownFetch<'a> {
    /// `dhDerniereMajFichier` cutoff, `YYYY-MM-DDTHH:MM:SS`.
    pub since: &'a str,
    pub shape: BreakdownShape,
    pub timeout: Duration,
    pub chunk_size: usize,
}

/// Step 3: upsert the tickets changed since one period cutoff.
pub async fn sync_breakdowns(
    upstream: &dyn Upstream,
    store: &dyn RecordStore,
    period_idx: usize,
) -> StepReport {
    let step = Step::Breakdowns { period: period_idx };
    let Some(since) = PERIODS.get(period_idx) else {
        return StepReport::done(step.id(), "All periods completed", Step::Derived.hint());
    };

    let token = match open_session(upstream, step).await {
        Ok(token) => token,
        Err(report) => return report,
    };

    let fetch = BreakdownFetch {
        since,
        shape: BreakdownShape::FullSync,
        timeout: timeouts::BREAKDOWNS,
        chunk_size: chunks::FULL_SYNC,
    };
    let mut report = fetch_and_upsert(upstream, store, &token, fetch).await;
    report.period = Some(since.to_string());
    report.period_idx = Some(period_idx);
    if report.status != StepStatus::Error {
        report.next = step.next_hint();
    }
    report
}

/// Fetch tickets changed since `fetch.since` and upsert them by ticket id.
///
/// Records without a ticket id are counted as skipped; a rejected batch makes the report partial
/// without stopping the following batches.
pub async fn fetch_and_upsert(
    upstream: &dyn Upstream,
    store: &dyn RecordStore,
    token: &SessionToken,
    fetch: BreakdownFetch<'_>,
) -> StepReport {
    let step_id = Step::Breakdowns { period: 0 }.id();

    let body = match upstream
        .call(
            methods::BREAKDOWNS,
            &[("dhDerniereMajFichier", fetch.since.to_string())],
            token,
            fetch.timeout,
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to fetch breakdowns since {}: {}", fetch.since, e);
            return StepReport::error(step_id, e.to_string());
        }
    };

    let items = xml::parse_items(&body, RECORD_TAG);
    let now = Utc::now();

    let mut report = StepReport::new(step_id);
    report.found = items.len();

    if let Some(first) = items.first() {
        tracing::debug!(
            "First breakdown record fields: {:?}",
            first.field_names().take(15).collect::<Vec<_>>()
        );
    }

    // One row per ticket: the store rejects a batch that hits the same key twice.
    let mut by_ticket: BTreeMap<i64, Row> = BTreeMap::new();
    for item in &items {
        match BreakdownRow::from_record(item, fetch.shape, now) {
            Some(row) => {
                by_ticket.insert(row.ticket_id, to_row(&row));
            }
            None => report.skipped += 1,
        }
    }
    let rows: Vec<Row> = by_ticket.into_values().collect();

    if report.skipped > 0 {
        tracing::warn!(
            "{} breakdown records without {} skipped",
            report.skipped,
            fetch.shape.key_field()
        );
    }

    write_batches(
        store,
        tables::BREAKDOWNS,
        &rows,
        fetch.chunk_size,
        WriteMode::Upsert {
            on_conflict: breakdown::KEY_COLUMN,
        },
        &mut report,
    )
    .await;

    tracing::info!(
        "Breakdowns since {}: {} found, {} upserted, {} skipped, {} failed",
        fetch.since,
        report.found,
        report.written,
        report.skipped,
        report.failed
    );

    report
}
