use chrono::Utc;

use crate::jobs::{SECTORS, Step, WriteMode, chunks, open_session, write_batches};
use crate::models::equipment::{self, EquipmentRow};
use crate::models::sync::StepReport;
use crate::parsers::xml;
use crate::services::progilift::{FULL_HISTORY, Upstream, methods, timeouts};
use crate::services::record_store::{RecordStore, Row, tables, to_row};

const RECORD_TAG: &str = "tabListeWsoucont";

/// Step 2: upsert the core equipment columns of one sector.
pub async fn sync_equipment(
    upstream: &dyn Upstream,
    store: &dyn RecordStore,
    sector_idx: usize,
) -> StepReport {
    let step = Step::Equipment { sector: sector_idx };
    let Some(sector) = SECTORS.get(sector_idx) else {
        return StepReport::done(step.id(), "All sectors completed", Step::VisitDates { sector: 0 }.hint());
    };

    let token = match open_session(upstream, step).await {
        Ok(token) => token,
        Err(report) => return report,
    };

    tracing::info!("Syncing equipment for sector {} ({}/{})", sector, sector_idx + 1, SECTORS.len());

    let body = match upstream
        .call(
            methods::EQUIPMENT,
            &[
                ("dhDerniereMajFichier", FULL_HISTORY.to_string()),
                ("sListeSecteursTechnicien", sector.to_string()),
            ],
            &token,
            timeouts::EQUIPMENT,
        )
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to fetch equipment for sector {}: {}", sector, e);
            let mut report = StepReport::error(step.id(), e.to_string());
            report.sector = Some(sector.to_string());
            report.sector_idx = Some(sector_idx);
            return report;
        }
    };

    let items = xml::parse_items(&body, RECORD_TAG);
    let now = Utc::now();

    let mut report = StepReport::new(step.id());
    report.sector = Some(sector.to_string());
    report.sector_idx = Some(sector_idx);
    report.found = items.len();

    let rows: Vec<Row> = items
        .iter()
        .filter_map(|item| {
            let row = EquipmentRow::from_record(item, now);
            if row.is_none() {
                report.skipped += 1;
            }
            row
        })
        .map(|row| to_row(&row))
        .collect();

    write_batches(
        store,
        tables::EQUIPMENT,
        &rows,
        chunks::FULL_SYNC,
        WriteMode::Upsert {
            on_conflict: equipment::KEY_COLUMN,
        },
        &mut report,
    )
    .await;

    tracing::info!(
        "Sector {} equipment: {} found, {} upserted, {} skipped, {} failed",
        sector,
        report.found,
        report.written,
        report.skipped,
        report.failed
    );

    report.next = step.next_hint();
    report
}
