use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use crate::jobs::Step;
use crate::jobs::flags::{self, FlagReconciliation};
use crate::models::equipment::{ANNUAL_VISITS_COLUMN, KEY_COLUMN, PLANNING_TYPE_COLUMN};
use crate::models::sync::{DerivedCounts, StepReport, StepStatus};
use crate::models::sync_log::{RunKind, RunOutcome, SyncLogEntry};
use crate::services::record_store::{Filter, RecordStore, Row, SelectQuery, tables};
use crate::services::run_log;

/// Step 4: recompute annual visit counts and stopped flags, then log the full sync.
///
/// Flags are fully reconciled here: after this step every equipment row is flagged stopped exactly
/// when its key is in the stoppage snapshot.
pub async fn run_derived_pass(store: &dyn RecordStore) -> StepReport {
    let step = Step::Derived;
    let started = Instant::now();

    let planning = match store
        .select(&SelectQuery::new(tables::PLANNING_TYPES).columns(&["code", "nb_visites"]))
        .await
    {
        Ok(rows) => rows,
        Err(e) => return StepReport::error(step.id(), e.to_string()),
    };

    let visits_by_code: HashMap<String, Value> = planning
        .iter()
        .filter_map(|r| {
            let code = r.get("code")?.as_str()?.to_string();
            Some((code, r.get("nb_visites").cloned().unwrap_or(Value::Null)))
        })
        .collect();
    if visits_by_code.is_empty() {
        return StepReport::error(
            step.id(),
            "parc_type_planning table is empty. Run ?step=0 first.",
        );
    }

    let with_planning = match store
        .select(
            &SelectQuery::new(tables::EQUIPMENT)
                .columns(&[KEY_COLUMN, PLANNING_TYPE_COLUMN, ANNUAL_VISITS_COLUMN])
                .filter(Filter::not_null(PLANNING_TYPE_COLUMN)),
        )
        .await
    {
        Ok(rows) => rows,
        Err(e) => return StepReport::error(step.id(), e.to_string()),
    };

    let mut report = StepReport::new(step.id());
    let mut counts = DerivedCounts {
        planning_codes: visits_by_code.len(),
        equipment_with_planning: with_planning.len(),
        ..Default::default()
    };

    for row in &with_planning {
        let (Some(key), Some(code)) = (
            row.get(KEY_COLUMN),
            row.get(PLANNING_TYPE_COLUMN).and_then(Value::as_str),
        ) else {
            continue;
        };
        let Some(visits) = visits_by_code.get(code) else {
            continue;
        };
        if row.get(ANNUAL_VISITS_COLUMN) == Some(visits) {
            continue;
        }

        let mut patch = Row::new();
        patch.insert(ANNUAL_VISITS_COLUMN.to_string(), visits.clone());
        match store.update(tables::EQUIPMENT, KEY_COLUMN, key, &patch).await {
            Ok(()) => counts.visits_updated += 1,
            Err(e) => report.record_failure(1, format!("{} {}: {}", ANNUAL_VISITS_COLUMN, key, e)),
        }
    }

    let stopped = match flags::current_stopped_ids(store).await {
        Ok(ids) => ids,
        Err(e) => return StepReport::error(step.id(), e.to_string()),
    };
    counts.stopped = stopped.len();

    match flags::reconcile_stopped_flags(store, &stopped, FlagReconciliation::ClearThenSet).await {
        Ok(outcome) => {
            counts.equipment_total = outcome.examined;
            counts.flags_changed = outcome.changed;
            for error in outcome.errors {
                report.record_failure(1, error);
            }
        }
        Err(e) => {
            tracing::error!("Failed to reconcile stopped flags: {}", e);
            report.record_failure(0, e.to_string());
        }
    }

    report.written = counts.visits_updated + counts.flags_changed;

    let breakdown_count = store.count(tables::BREAKDOWNS, &[]).await.unwrap_or_else(|e| {
        tracing::warn!("Failed to count breakdowns: {}", e);
        0
    });

    let entry = SyncLogEntry {
        sync_date: Utc::now(),
        sync_type: RunKind::Full,
        status: if report.status == StepStatus::Success {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        },
        equipment_count: counts.equipment_total as i64,
        breakdown_count: breakdown_count as i64,
        stoppage_count: counts.stopped as i64,
        duration_seconds: run_log::round_to(started.elapsed().as_secs_f64(), 2),
        error: (!report.errors.is_empty()).then(|| report.errors.join("; ")),
    };
    if let Err(e) = run_log::record_run(store, entry).await {
        tracing::warn!("Failed to record full sync run: {}", e);
        report.record_failure(0, e.to_string());
    }

    tracing::info!(
        "Derived pass complete: {} visit counts updated, {} of {} flags changed, {} stopped",
        counts.visits_updated,
        counts.flags_changed,
        counts.equipment_total,
        counts.stopped
    );

    report.message = Some("nb_visites_an and en_arret flags updated".to_string());
    report.derived = Some(counts);
    report
}
