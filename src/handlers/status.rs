use std::collections::BTreeSet;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use crate::{
    AppState,
    error::Result,
    models::status::{FleetTotals, LastRunSummary, StatusResponse},
    services::{
        record_store::{Filter, RecordStore, Row, SelectQuery, tables},
        run_log,
    },
};

const RECENT_STOPPAGES: usize = 10;
const BREAKDOWN_WINDOW_DAYS: i64 = 30;

/// Handler for GET /api/status
/// Fleet totals, the latest stoppages and a summary of the last run.
pub async fn get_status(State(state): State<AppState>) -> Response {
    match build_status(state.store.as_ref()).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!("Failed to build status: {}", e);
            Json(json!({"status": "error", "message": e.to_string()})).into_response()
        }
    }
}

async fn build_status(store: &dyn RecordStore) -> Result<StatusResponse> {
    let since = (Utc::now() - Duration::days(BREAKDOWN_WINDOW_DAYS))
        .format("%Y-%m-%d")
        .to_string();

    let sectors: BTreeSet<String> = store
        .select(&SelectQuery::new(tables::EQUIPMENT).columns(&["secteur"]))
        .await?
        .iter()
        .filter_map(|r| match r.get("secteur")? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();

    let totals = FleetTotals {
        equipment: store.count(tables::EQUIPMENT, &[]).await?,
        breakdowns: store.count(tables::BREAKDOWNS, &[]).await?,
        breakdowns_30d: store
            .count(tables::BREAKDOWNS, &[Filter::gte("date_appel", since)])
            .await?,
        stoppages: store.count(tables::STOPPAGES, &[]).await?,
        sectors: sectors.len(),
    };

    let current_stoppages = store
        .select(
            &SelectQuery::new(tables::STOPPAGES)
                .columns(&[
                    "code_appareil",
                    "adresse",
                    "ville",
                    "secteur",
                    "date_appel",
                    "heure_appel",
                    "motif",
                ])
                .order_desc("date_appel")
                .limit(RECENT_STOPPAGES),
        )
        .await?
        .into_iter()
        .map(Value::Object)
        .collect();

    let last_sync = run_log::last_run(store).await?.as_ref().map(summarize_run);

    Ok(StatusResponse {
        status: "ok".to_string(),
        totals,
        current_stoppages,
        last_sync,
    })
}

fn summarize_run(row: &Row) -> LastRunSummary {
    let field = |name: &str| row.get(name).cloned();
    let count = |name: &str| row.get(name).cloned().unwrap_or_else(|| json!(0));

    LastRunSummary {
        date: field("sync_date"),
        kind: field("sync_type"),
        status: field("status"),
        duration: field("duration_seconds"),
        equipment: count("equipements_count"),
        breakdowns: count("pannes_count"),
        stoppages: count("arrets_count"),
    }
}
