//! `/acks` handler.

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
pub struct AckBody {
    pub room_id: String,
    pub up_to_seq: i64,
}

pub async fn ack(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(body): Json<AckBody>,
) -> Result<Response, AppError> {
    state.ack().ack(&auth.tenant_id, &auth.user_id, &body.room_id, body.up_to_seq)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
