use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    AppState,
    handlers::first_value,
    models::status::{ErrorResponse, LogStatsResponse},
    services::run_log::{self, STATS_WINDOW},
};

const DEFAULT_LIMIT: usize = 50;
const RECENT_WITH_STATS: usize = 10;

#[derive(Debug, Default)]
pub struct LogsQuery {
    pub limit: Option<String>,
    /// `type` in the query string.
    pub kind: Option<String>,
    pub status: Option<String>,
    pub stats: Option<String>,
}

impl LogsQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            limit: first_value(pairs, "limit"),
            kind: first_value(pairs, "type"),
            status: first_value(pairs, "status"),
            stats: first_value(pairs, "stats"),
        }
    }
}

/// Handler for GET /api/logs
/// Run log rows, newest first. `stats=1` returns aggregates over the last runs instead.
pub async fn get_logs(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = LogsQuery::from_pairs(&pairs);
    let store = state.store.as_ref();

    if query.stats.as_deref() == Some("1") {
        return match run_log::recent_runs(store, STATS_WINDOW, None, None).await {
            Ok(runs) => {
                let stats = run_log::compute_stats(&runs);
                let recent_logs: Vec<Value> = runs
                    .into_iter()
                    .take(RECENT_WITH_STATS)
                    .map(Value::Object)
                    .collect();
                Json(LogStatsResponse { stats, recent_logs }).into_response()
            }
            Err(e) => error_response(e.to_string()),
        };
    }

    let limit = match query.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_LIMIT,
        Some(raw) => match raw.parse::<usize>() {
            Ok(limit) => limit,
            Err(_) => return error_response(format!("Invalid limit '{}'", raw)),
        },
    };

    let kind = query.kind.as_deref().filter(|s| !s.is_empty());
    let status = query.status.as_deref().filter(|s| !s.is_empty());

    match run_log::recent_runs(store, limit, kind, status).await {
        Ok(runs) => Json(runs).into_response(),
        Err(e) => error_response(e.to_string()),
    }
}

fn error_response(error: String) -> Response {
    tracing::error!("Failed to read run log: {}", error);
    Json(ErrorResponse { error }).into_response()
}
