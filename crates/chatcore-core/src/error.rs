//! Shared error type for the messaging engine (transport-agnostic).

use thiserror::Error;

/// Client-facing error codes (stable API, independent of transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Invalid,
    RateLimited,
    Transient,
    Internal,
}

impl ClientCode {
    /// String representation used in JSON error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Unauthorized => "UNAUTHORIZED",
            ClientCode::Forbidden => "FORBIDDEN",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Conflict => "CONFLICT",
            ClientCode::Invalid => "INVALID",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::Transient => "TRANSIENT",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Unified error type for the Store, Room Registry, Realtime Hub, Delivery
/// Coordinator, Ack Processor and Retry Worker.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("rate limited")]
    RateLimited,
    #[error("transient: {0}")]
    Transient(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl CoreError {
    /// Map an internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            CoreError::Unauthorized => ClientCode::Unauthorized,
            CoreError::Forbidden(_) => ClientCode::Forbidden,
            CoreError::NotFound(_) => ClientCode::NotFound,
            CoreError::Conflict(_) => ClientCode::Conflict,
            CoreError::Invalid(_) => ClientCode::Invalid,
            CoreError::RateLimited => ClientCode::RateLimited,
            CoreError::Transient(_) => ClientCode::Transient,
            CoreError::Internal(_) => ClientCode::Internal,
        }
    }
}
