//! WebSocket handler: upgrade, per-session writer task, heartbeat, and the
//! decode-once inbound loop. Grounded in the teacher's
//! `transport::ws::{ws_upgrade, run_session}` split (writer task owns the
//! socket's send half so the Hub never blocks on transport I/O).

use axum::{
    extract::{ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

use chatcore_core::protocol::{ClientFrame, ServerEvent};

use crate::app_state::AppState;
use crate::auth::draining_response;
use crate::transport::codec;

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    pub api_key: Option<String>,
    pub user_id: Option<String>,
}

/// WebSocket frames may be authenticated either via `X-Api-Key`/`X-User-Id`
/// headers or `?api_key=&user_id=` query params (some clients cannot set
/// custom headers on the handshake request), per spec §6.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.is_draining() {
        return draining_response();
    }

    let api_key = header_or_query(&headers, "x-api-key", q.api_key);
    let user_id = header_or_query(&headers, "x-user-id", q.user_id);

    let (Some(api_key), Some(user_id)) = (api_key, user_id) else {
        return (axum::http::StatusCode::UNAUTHORIZED, "missing api_key or user_id").into_response();
    };

    let tenant = match state.store().resolve_tenant(&api_key) {
        Ok(Some(t)) => t,
        Ok(None) => return (axum::http::StatusCode::UNAUTHORIZED, "unknown api key").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "tenant resolution failed");
            return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, tenant.tenant_id, user_id, socket))
}

fn header_or_query(headers: &HeaderMap, name: &str, query_val: Option<String>) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or(query_val)
}

async fn handle_socket(state: AppState, tenant_id: String, user_id: String, socket: WebSocket) {
    let span = tracing::info_span!("ws_session", tenant_id = %tenant_id, user_id = %user_id);
    run_session(state, tenant_id, user_id, socket).instrument(span).await;
}

async fn run_session(state: AppState, tenant_id: String, user_id: String, socket: WebSocket) {
    state.metrics().ws_upgrades.inc(&[]);
    state.metrics().ws_active_sessions.inc(&[]);

    let (mut ws_tx, mut ws_rx) = socket.split();

    let (handle, mut out_rx) = match state.lifecycle().connect(&tenant_id, &user_id, 1024) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "catch-up failed, closing connection");
            let _ = ws_tx.send(axum::extract::ws::Message::Close(None)).await;
            state.metrics().ws_active_sessions.dec(&[]);
            return;
        }
    };

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let ping_interval = Duration::from_secs(20);
    let idle_timeout = ping_interval * 3;
    let mut missed_pings = 0u32;
    let mut last_rx = Instant::now();
    let mut ping_tick = tokio::time::interval(ping_interval);

    loop {
        tokio::select! {
            _ = ping_tick.tick() => {
                missed_pings += 1;
                if missed_pings > 2 {
                    tracing::info!("missed two pings in a row; closing");
                    break;
                }
                if state.hub().try_send(&tenant_id, &user_id, &ServerEvent::Pong) == crate::hub::SendResult::SendError {
                    break;
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(msg)) => {
                        last_rx = Instant::now();
                        missed_pings = 0;
                        match codec::decode(msg) {
                            Ok(codec::Inbound::Frame(ClientFrame::Ping)) => {
                                state.hub().try_send(&tenant_id, &user_id, &ServerEvent::Pong);
                            }
                            Ok(codec::Inbound::Frame(ClientFrame::Ack { room_id, up_to_seq })) => {
                                match state.ack().ack(&tenant_id, &user_id, &room_id, up_to_seq) {
                                    Ok(_) => {}
                                    Err(e) => {
                                        state.hub().try_send(&tenant_id, &user_id, &ServerEvent::Error {
                                            code: e.client_code().as_str(),
                                            message: e.to_string(),
                                        });
                                    }
                                }
                            }
                            Ok(codec::Inbound::Ping(_)) | Ok(codec::Inbound::Pong(_)) => {}
                            Ok(codec::Inbound::Close) => break,
                            Err(e) => {
                                state.metrics().decode_errors.inc(&[]);
                                tracing::warn!(code = %e.client_code().as_str(), "decode failed");
                            }
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }

            _ = tokio::time::sleep_until((last_rx + idle_timeout).into()) => {
                tracing::info!("idle timeout; closing");
                break;
            }
        }
    }

    state.lifecycle().disconnect(&tenant_id, &user_id, handle);
    writer.abort();
    state.metrics().ws_active_sessions.dec(&[]);
}
