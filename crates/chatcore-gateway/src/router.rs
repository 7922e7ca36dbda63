//! Axum router wiring: REST surface, WS upgrade, ops endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rooms", post(api::rooms::create_room))
        .route("/rooms/:room_id", get(api::rooms::get_room))
        .route("/rooms/:room_id/members", get(api::rooms::list_members))
        .route("/rooms/:room_id/messages", post(api::messages::publish).get(api::messages::history))
        .route("/acks", post(api::acks::ack))
        .route("/notify", post(api::notify::notify))
        .route("/health", get(ops::health))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/ws", get(transport::ws::ws_upgrade))
        .with_state(state)
}
