use std::sync::Arc;

use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ingest::types::SourceId;
use crate::monitor::Monitor;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }
}

/// JSON read-outs of the published snapshots plus the two triggers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/forecast", get(forecast))
        .route("/validation", get(validation))
        .route("/risk", get(risk))
        .route("/refresh", post(refresh))
        .route("/sources/{id}/retry", post(retry_source))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn forecast(State(state): State<AppState>) -> Response {
    Json(state.monitor.forecast()).into_response()
}

async fn validation(State(state): State<AppState>) -> Response {
    let m = &state.monitor;
    Json(json!({
        "sources": m.validation(),
        "summary": m.validation_summary(),
    }))
    .into_response()
}

async fn risk(State(state): State<AppState>) -> Response {
    Json(state.monitor.risk_report()).into_response()
}

/// Runs a full cycle and answers when it settles. On total failure the
/// previous forecast is returned with 503.
async fn refresh(State(state): State<AppState>) -> Response {
    match state.monitor.refresh().await {
        Ok(forecast) => Json(forecast).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": e.to_string(),
                "forecast": state.monitor.forecast(),
            })),
        )
            .into_response(),
    }
}

async fn retry_source(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id: SourceId = match id.parse() {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response(),
    };
    match state.monitor.retry_source(id).await {
        Ok(entry) => Json(json!({ "source": id, "validation": entry })).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}
