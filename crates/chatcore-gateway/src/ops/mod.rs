//! Operational HTTP endpoints.
//!
//! - `/health`  : liveness + store ping (spec §6)
//! - `/readyz`  : readiness (503 when draining)
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app_state::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    match state.store().ping() {
        Ok(()) => {
            let status = if state.is_draining() { "draining" } else { "ok" };
            (StatusCode::OK, Json(json!({ "status": status, "uptime": state.uptime_secs() }))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "health check store ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": "error", "uptime": state.uptime_secs() })))
                .into_response()
        }
    }
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render(&[]);
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
