//! `/notify`: async enqueue to the `notifications` table. The relay that
//! drains this table and actually pushes to subscribers is an external
//! collaborator, out of scope here.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth::AuthContext;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct NotifyBody {
    pub target_user_id: String,
    pub payload: serde_json::Value,
}

pub async fn notify(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(body): Json<NotifyBody>,
) -> Result<Response, AppError> {
    let id = state.store().enqueue_notification(&auth.tenant_id, &body.target_user_id, &body.payload)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "notification_id": id }))).into_response())
}
