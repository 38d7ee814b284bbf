// Troupe Server - Observability routes

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_json))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .route("/v1/system/logs", get(recent_logs))
}

async fn metrics_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.metrics.snapshot_json())
}

async fn metrics_prometheus(State(state): State<AppState>) -> (
    [(axum::http::HeaderName, &'static str); 1],
    String,
) {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.prometheus_text(),
    )
}

async fn recent_logs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entries = state.logs.recent();
    Json(json!({
        "entries": entries,
        "count": entries.len(),
    }))
}
