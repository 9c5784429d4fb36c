//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, body limit, trace)
//!     → handlers.rs (headers + body → GateRequest)
//!     → gate (identity → rate limit → validation → action)
//!         → upstream.rs (forward to the operation's backend)
//!     → response.rs (GateOutcome → status, headers, JSON body)
//! ```

pub mod handlers;
pub mod response;
pub mod server;
pub mod upstream;

pub use server::{build_router, AppState, GateServer};
pub use upstream::UpstreamAction;
