// src/lib.rs

use std::any::Any;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::{Any as AnyOrigin, CorsLayer}, trace::TraceLayer};

use jobs::fast_path::FastPathOptions;
use services::{progilift::Upstream, record_store::RecordStore};

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod parsers;
pub mod services;

/// Longest diagnostic echoed back when a request panics.
const MAX_TRACE_LEN: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn Upstream>,
    pub store: Arc<dyn RecordStore>,
    pub fast_path: FastPathOptions,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/api/sync",
            get(handlers::sync::trigger_sync).post(handlers::sync::trigger_sync),
        )
        .route(
            "/api/cron",
            get(handlers::sync::trigger_fast_path).post(handlers::sync::trigger_fast_path),
        )
        .route("/api/logs", get(handlers::logs::get_logs))
        .route("/api/status", get(handlers::status::get_status))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Callers always get a 200 JSON body, even when a handler panics.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };
    tracing::error!("Request panicked: {}", message);

    // The handler's stack is gone by now; the payload is the only diagnostic left.
    let trace = error::truncate(&format!("panicked: {}", message), MAX_TRACE_LEN);
    (
        StatusCode::OK,
        Json(json!({
            "status": "error",
            "message": message,
            "trace": trace,
        })),
    )
        .into_response()
}
