//! Request authentication: resolves `X-API-Key` to a tenant and trusts
//! `X-User-Id` as the acting user's identity.
//!
//! The tenant validator proper is an external collaborator (spec §1); this
//! module is the narrow seam the core needs — resolving a verified API key
//! to a `tenant_id` via `Store::resolve_tenant` — generalized from the
//! teacher's `context::tenant::TenantContext`/`AppState::resolve_ticket`
//! stub into a real Store-backed lookup.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use chatcore_core::error::CoreError;

use crate::app_state::AppState;
use crate::error::AppError;

const API_KEY_HEADER: &str = "x-api-key";
const USER_ID_HEADER: &str = "x-user-id";

/// Verified caller identity attached to every protected request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: String,
    pub user_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let api_key = header_str(parts, API_KEY_HEADER)
            .ok_or_else(|| AppError::from(CoreError::Unauthorized).into_response())?;
        let user_id = header_str(parts, USER_ID_HEADER)
            .ok_or_else(|| AppError::from(CoreError::Invalid("missing X-User-Id".into())).into_response())?;

        let tenant = state
            .store()
            .resolve_tenant(&api_key)
            .map_err(|e| AppError::from(e).into_response())?
            .ok_or_else(|| AppError::from(CoreError::Unauthorized).into_response())?;

        Ok(AuthContext { tenant_id: tenant.tenant_id, user_id })
    }
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts.headers.get(name)?.to_str().ok().map(|s| s.to_string())
}

/// 503 used while the gateway is draining (spec §5, §8 scenario 6).
pub fn draining_response() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response()
}
