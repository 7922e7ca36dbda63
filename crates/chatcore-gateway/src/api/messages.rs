//! `/rooms/{room_id}/messages` handlers: publish and history paging.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::time::Instant;

use crate::app_state::AppState;
use crate::auth::AuthContext;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PublishBody {
    pub content: String,
    pub meta: Option<serde_json::Value>,
}

pub async fn publish(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<PublishBody>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let message = state
        .room_registry()
        .publish(state.store(), &auth.tenant_id, &auth.user_id, &room_id, &body.content, body.meta.as_ref())
        .await?;
    state.metrics().publish_duration.observe(&[], started.elapsed());

    if let Err(e) = state.delivery().deliver(&message).await {
        tracing::error!(error = %e, room_id = %room_id, "delivery fan-out failed after publish");
        state.metrics().delivery_errors.inc(&[]);
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message_id": message.message_id,
            "seq": message.seq,
            "created_at": message.created_at,
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub after_seq: Option<i64>,
    pub limit: Option<i64>,
}

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const MAX_HISTORY_LIMIT: i64 = 500;

pub async fn history(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    if !state.store().is_member(&auth.tenant_id, &room_id, &auth.user_id)? {
        return Err(chatcore_core::CoreError::Forbidden(format!("{} is not a member of {room_id}", auth.user_id)).into());
    }

    let after_seq = q.after_seq.unwrap_or(0);
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let messages = state.store().fetch_missed_since(&auth.tenant_id, &room_id, after_seq, limit)?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "messages": messages }))).into_response())
}
