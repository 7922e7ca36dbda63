//! HTTP polish for `chatcore_core::CoreError`. Kept in the gateway crate
//! (not `chatcore-core`) because the mapping depends on `axum`, which the
//! core crate does not depend on.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use chatcore_core::error::{ClientCode, CoreError};
use serde_json::json;

pub struct AppError(pub CoreError);

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        AppError(e)
    }
}

fn status_for(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::Invalid => StatusCode::BAD_REQUEST,
        ClientCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ClientCode::Forbidden => StatusCode::FORBIDDEN,
        ClientCode::NotFound => StatusCode::NOT_FOUND,
        ClientCode::Conflict => StatusCode::CONFLICT,
        ClientCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ClientCode::Transient | ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let status = status_for(code);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }
        let body = Json(json!({
            "error": code.as_str(),
            "code": code.as_str(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
