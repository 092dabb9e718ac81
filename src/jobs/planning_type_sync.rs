use crate::jobs::{Step, WriteMode, chunks, open_session, write_batches};
use crate::models::planning_type::PlanningTypeRow;
use crate::models::sync::StepReport;
use crate::parsers::xml;
use crate::services::progilift::{FULL_HISTORY, Upstream, methods, timeouts};
use crate::services::record_store::{RecordStore, Row, tables, to_row};

/// Element names the planning-type records have been seen under
const RECORD_TAGS: [&str; 3] = ["tabListeWtypepla", "ST_Wtypepla", "Wtypepla"];

/// Step 0: replace the planning-type reference table.
pub async fn sync_planning_types(upstream: &dyn Upstream, store: &dyn RecordStore) -> StepReport {
    let step = Step::PlanningTypes;
    let token = match open_session(upstream, step).await {
        Ok(token) => token,
        Err(report) => return report,
    };

    let body = match upstream
        .call(
            methods::PLANNING_TYPES,
            &[("dhDerniereMajFichier", FULL_HISTORY.to_string())],
            &token,
            timeouts::REFERENCE,
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to fetch planning types: {}", e);
            return StepReport::error(step.id(), e.to_string());
        }
    };

    let items = xml::parse_items_any(&body, &RECORD_TAGS);
    if items.is_empty() {
        // Keep the current table rather than wiping it for an empty answer.
        tracing::warn!("No planning types in a {} byte response", body.len());
        return StepReport::error(step.id(), "No data in Wtypepla response");
    }

    let mut report = StepReport::new(step.id());
    report.found = items.len();

    let rows: Vec<Row> = items
        .iter()
        .filter_map(|item| {
            let row = PlanningTypeRow::from_record(item);
            if row.is_none() {
                report.skipped += 1;
            }
            row
        })
        .map(|row| to_row(&row))
        .collect();

    if let Err(e) = store.delete_all(tables::PLANNING_TYPES).await {
        tracing::error!("Failed to clear planning types: {}", e);
        return StepReport::error(step.id(), e.to_string());
    }

    write_batches(
        store,
        tables::PLANNING_TYPES,
        &rows,
        chunks::FULL_SYNC,
        WriteMode::Insert,
        &mut report,
    )
    .await;

    tracing::info!(
        "Planning types sync complete: {} found, {} inserted, {} without code",
        report.found,
        report.written,
        report.skipped
    );

    report.next = step.next_hint();
    report
}
