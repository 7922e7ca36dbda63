//! Top-level facade crate for chatcore.
//!
//! Re-exports the domain crate and the gateway service library so downstream
//! consumers can depend on a single crate.

pub mod core {
    pub use chatcore_core::*;
}

pub mod gateway {
    pub use chatcore_gateway::*;
}
