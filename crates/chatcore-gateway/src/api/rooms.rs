//! `/rooms` handlers: create-or-get, fetch, list members.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use chatcore_core::domain::RoomSpec;

use crate::app_state::AppState;
use crate::auth::AuthContext;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateRoomBody {
    #[serde(rename = "type")]
    pub room_type: chatcore_core::domain::RoomType,
    pub members: Vec<String>,
    pub name: Option<String>,
    pub unique_key: Option<String>,
}

pub async fn create_room(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<Response, AppError> {
    let spec = RoomSpec {
        room_type: body.room_type,
        members: body.members,
        name: body.name,
        unique_key: body.unique_key,
    };
    let room = state.store().create_room(&auth.tenant_id, &spec)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "room": room }))).into_response())
}

pub async fn get_room(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Response, AppError> {
    let room = state.store().get_room(&auth.tenant_id, &room_id)?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "room": room }))).into_response())
}

pub async fn list_members(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Response, AppError> {
    let members = state.store().list_members(&auth.tenant_id, &room_id)?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "members": members }))).into_response())
}
