use std::collections::BTreeSet;

use chrono::Utc;

use crate::jobs::{Step, WriteMode, chunks, open_session, write_batches};
use crate::models::stoppage::StoppageRow;
use crate::models::sync::{StepReport, StepStatus};
use crate::parsers::xml;
use crate::services::progilift::{SessionToken, Upstream, methods, timeouts};
use crate::services::record_store::{RecordStore, Row, tables, to_row};

const RECORD_TAG: &str = "tabListeArrets";

/// Step 1: replace the stoppage snapshot.
pub async fn sync_stoppages(upstream: &dyn Upstream, store: &dyn RecordStore) -> StepReport {
    let token = match open_session(upstream, Step::Stoppages).await {
        Ok(token) => token,
        Err(report) => return report,
    };

    let mut report = replace_stoppages(upstream, store, &token).await;
    if report.status != StepStatus::Error {
        report.next = Step::Stoppages.next_hint();
    }
    report
}

/// Fetch the current stoppages and swap them in for the previous snapshot.
///
/// The old rows are only deleted once the fetch has succeeded, so a failed call leaves the last
/// known snapshot in place. `stopped_ids` on the report carries the equipment keys now stopped.
/// Two runs interleaving here can leave a mixed table; callers must not overlap them.
pub async fn replace_stoppages(
    upstream: &dyn Upstream,
    store: &dyn RecordStore,
    token: &SessionToken,
) -> StepReport {
    let step_id = Step::Stoppages.id();

    let body = match upstream
        .call(methods::STOPPAGES, &[], token, timeouts::STOPPAGES)
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to fetch stoppages: {}", e);
            return StepReport::error(step_id, e.to_string());
        }
    };

    let items = xml::parse_items(&body, RECORD_TAG);
    let now = Utc::now();

    let mut report = StepReport::new(step_id);
    report.found = items.len();

    let mut stopped = BTreeSet::new();
    let mut rows: Vec<Row> = Vec::with_capacity(items.len());
    for item in &items {
        match StoppageRow::from_record(item, now) {
            Some(row) => {
                stopped.insert(row.equipment_id);
                rows.push(to_row(&row));
            }
            None => report.skipped += 1,
        }
    }

    if let Err(e) = store.delete_all(tables::STOPPAGES).await {
        tracing::error!("Failed to clear stoppage snapshot: {}", e);
        return StepReport::error(step_id, e.to_string());
    }

    write_batches(
        store,
        tables::STOPPAGES,
        &rows,
        chunks::SMALL,
        WriteMode::Insert,
        &mut report,
    )
    .await;

    tracing::info!(
        "Stoppage snapshot replaced: {} found, {} inserted, {} without equipment id",
        report.found,
        report.written,
        report.skipped
    );

    report.stopped_ids = Some(stopped.into_iter().collect());
    report
}
