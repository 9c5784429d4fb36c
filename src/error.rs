//! Gate error taxonomy.

use std::time::Duration;
use thiserror::Error;

use crate::validation::Violation;

/// Everything a gated request can end in besides success.
///
/// The first four variants are caller-facing and carry only what the caller
/// needs to self-correct. `ActionFailed` hides its cause (it is kept in the
/// audit context). `AuditGap` is an operator signal and never reaches callers.
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited, retry after {}s", .retry_after.as_secs_f64().ceil())]
    RateLimited { retry_after: Duration },

    #[error("invalid input: {} violation(s)", .violations.len())]
    InvalidInput { violations: Vec<Violation> },

    #[error("action failed")]
    ActionFailed,

    #[error("request aborted before the action finished")]
    Aborted,

    #[error("audit gap: request {request_id} on {operation} executed without an outcome entry")]
    AuditGap { request_id: String, operation: String },
}

impl GateError {
    /// Safe to show to the caller.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, GateError::AuditGap { .. })
    }
}
