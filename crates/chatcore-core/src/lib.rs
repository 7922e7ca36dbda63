//! chatcore core: shared domain types, wire protocol and error types for the
//! multitenant messaging engine (transport-agnostic, no tokio, no axum, no
//! SQL).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod domain;
pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{CoreError, Result};
