//! Request gate for privileged operations.
//!
//! Every protected call passes identity verification, per-identity rate
//! limiting and schema validation, in that order, and leaves an append-only
//! audit trail of the decision and of what the action did.

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod validation;

pub use config::schema::GateConfig;
pub use error::GateError;
pub use gate::{Gate, GateRequest, GateResponse};
pub use http::GateServer;
pub use lifecycle::Shutdown;
