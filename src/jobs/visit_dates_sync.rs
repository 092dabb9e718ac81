use chrono::Utc;
use serde_json::Value;

use crate::jobs::{SECTORS, Step, open_session};
use crate::models::equipment::{self, VisitDatesPatch};
use crate::models::sync::StepReport;
use crate::parsers::xml;
use crate::services::progilift::{FULL_HISTORY, Upstream, methods, timeouts};
use crate::services::record_store::{RecordStore, tables, to_row};

const RECORD_TAG: &str = "tabListeWsoucont2";

/// Step 2b: patch the visit dates of one sector's equipment from the supplemental feed.
pub async fn sync_visit_dates(
    upstream: &dyn Upstream,
    store: &dyn RecordStore,
    sector_idx: usize,
) -> StepReport {
    let step = Step::VisitDates { sector: sector_idx };
    let Some(sector) = SECTORS.get(sector_idx) else {
        return StepReport::done(step.id(), "All sectors completed", Step::Breakdowns { period: 0 }.hint());
    };

    let token = match open_session(upstream, step).await {
        Ok(token) => token,
        Err(report) => return report,
    };

    let body = match upstream
        .call(
            methods::EQUIPMENT_SUPPLEMENT,
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
            tracing::error!("Failed to fetch visit dates for sector {}: {}", sector, e);
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

    for item in &items {
        let Some((equipment_id, patch)) = VisitDatesPatch::from_record(item, now) else {
            report.skipped += 1;
            continue;
        };

        match store
            .update(
                tables::EQUIPMENT,
                equipment::KEY_COLUMN,
                &Value::from(equipment_id),
                &to_row(&patch),
            )
            .await
        {
            Ok(()) => report.written += 1,
            Err(e) => {
                tracing::warn!("Failed to update visit dates of {}: {}", equipment_id, e);
                report.record_failure(1, format!("{}: {}", equipment_id, e));
            }
        }
    }

    tracing::info!(
        "Sector {} visit dates: {} found, {} updated, {} skipped, {} failed",
        sector,
        report.found,
        report.written,
        report.skipped,
        report.failed
    );

    report.next = step.next_hint();
    report
}
