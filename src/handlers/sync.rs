use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{
    AppState,
    handlers::first_value,
    jobs::{self, PERIODS, SECTORS, Step, fast_path::run_fast_path},
    models::sync::StepReport,
    services::record_store::tables,
};

#[derive(Debug, Default, PartialEq)]
pub struct SyncQuery {
    pub step: Option<String>,
    pub sector: Option<String>,
    pub period: Option<String>,
    pub mode: Option<String>,
}

impl SyncQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            step: first_value(pairs, "step"),
            sector: first_value(pairs, "sector"),
            period: first_value(pairs, "period"),
            mode: first_value(pairs, "mode"),
        }
    }
}

/// Handler for GET|POST /api/sync
/// Runs one step, or the fast path with `mode=cron`. Always answers 200; failures are in the body.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = SyncQuery::from_pairs(&pairs);
    if query.mode.as_deref() == Some("cron") {
        return trigger_fast_path(State(state)).await;
    }

    let Some(step_id) = query.step.as_deref().filter(|s| !s.is_empty()) else {
        return Json(ready_descriptor()).into_response();
    };

    let sector = match parse_index(query.sector.as_deref(), "sector") {
        Ok(i) => i,
        Err(message) => return Json(StepReport::error(step_id, message)).into_response(),
    };
    let period = match parse_index(query.period.as_deref(), "period") {
        Ok(i) => i,
        Err(message) => return Json(StepReport::error(step_id, message)).into_response(),
    };

    match Step::from_query(step_id, sector, period) {
        Some(step) => {
            let report = jobs::run_step(state.upstream.as_ref(), state.store.as_ref(), step).await;
            Json(report).into_response()
        }
        None => {
            tracing::debug!("Unknown step '{}', returning descriptor", step_id);
            Json(ready_descriptor()).into_response()
        }
    }
}

/// Handler for GET|POST /api/cron
pub async fn trigger_fast_path(State(state): State<AppState>) -> Response {
    let report = run_fast_path(state.upstream.as_ref(), state.store.as_ref(), &state.fast_path).await;
    Json(report).into_response()
}

fn parse_index(raw: Option<&str>, name: &str) -> Result<usize, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| format!("Invalid {} '{}': expected a non-negative integer", name, value)),
    }
}

fn ready_descriptor() -> Value {
    let mut endpoints = serde_json::Map::new();
    endpoints.insert("step0".into(), json!(format!("{} → planning types", Step::PlanningTypes.hint())));
    endpoints.insert("step1".into(), json!(format!("{} → current stoppages", Step::Stoppages.hint())));
    endpoints.insert(
        "step2".into(),
        json!(format!("?step=2&sector=0..{} → equipment", SECTORS.len() - 1)),
    );
    endpoints.insert(
        "step2b".into(),
        json!(format!("?step=2b&sector=0..{} → visit dates", SECTORS.len() - 1)),
    );
    endpoints.insert(
        "step3".into(),
        json!(format!("?step=3&period=0..{} → breakdowns", PERIODS.len() - 1)),
    );
    endpoints.insert(
        "step4".into(),
        json!(format!("{} → nb_visites_an and en_arret flags", Step::Derived.hint())),
    );
    endpoints.insert("cron".into(), json!("?mode=cron → stoppages and recent breakdowns"));

    json!({
        "status": "ready",
        "message": "Progilift sync API",
        "tables": {
            (tables::EQUIPMENT): "Equipment (id_wsoucont unique)",
            (tables::BREAKDOWNS): "Breakdown history (id_panne unique)",
            (tables::STOPPAGES): "Current stoppages",
            (tables::PLANNING_TYPES): "Planning types",
            (tables::SYNC_LOGS): "Sync run log",
        },
        "config": {
            "sectors": SECTORS.len(),
            "periods": PERIODS.len(),
        },
        "endpoints": endpoints,
        "full_sync_order": format!(
            "0 → 1 → 2 (x{}) → 2b (x{}) → 3 (x{}) → 4",
            SECTORS.len(),
            SECTORS.len(),
            PERIODS.len()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index(None, "sector"), Ok(0));
        assert_eq!(parse_index(Some(""), "sector"), Ok(0));
        assert_eq!(parse_index(Some("21"), "sector"), Ok(21));
        assert!(parse_index(Some("abc"), "sector").unwrap_err().contains("sector"));
        assert!(parse_index(Some("-1"), "period").is_err());
    }

    #[test]
    fn test_sync_query_from_repeated_pairs() {
        let pairs: Vec<(String, String)> = [("step", "2"), ("sector", "4"), ("sector", "9"), ("extra", "x")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let query = SyncQuery::from_pairs(&pairs);
        assert_eq!(query.step.as_deref(), Some("2"));
        assert_eq!(query.sector.as_deref(), Some("4"));
        assert_eq!(query.period, None);
        assert_eq!(SyncQuery::from_pairs(&[]), SyncQuery::default());
    }

    #[test]
    fn test_ready_descriptor() {
        let descriptor = ready_descriptor();
        assert_eq!(descriptor["status"], "ready");
        assert_eq!(descriptor["config"]["sectors"], 22);
        assert_eq!(descriptor["config"]["periods"], 7);
        assert_eq!(descriptor["full_sync_order"], "0 → 1 → 2 (x22) → 2b (x22) → 3 (x7) → 4");
    }
}
