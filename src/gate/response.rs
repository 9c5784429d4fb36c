//! The one response contract every gated request ends in.

use serde_json::Value;
use std::time::Duration;

use crate::error::GateError;
use crate::validation::Violation;

/// Why the gate stopped a request before the action.
#[derive(Debug, Clone, PartialEq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
    RateLimited { retry_after: Duration },
    InvalidInput { violations: Vec<Violation> },
}

impl Denial {
    /// Audit reason code of the stage that denied.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Denial::Unauthenticated => "unauthenticated",
            Denial::Forbidden => "forbidden",
            Denial::RateLimited { .. } => "rate_limited",
            Denial::InvalidInput { .. } => "invalid_input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateResponse {
    Executed(Value),
    Denied(Denial),
    /// The action ran and failed. The cause stays in the audit log.
    Failed,
    /// The action did not finish within the operation's timeout.
    Aborted,
}

impl GateResponse {
    pub fn label(&self) -> &'static str {
        match self {
            GateResponse::Executed(_) => "executed",
            GateResponse::Denied(_) => "denied",
            GateResponse::Failed => "failed",
            GateResponse::Aborted => "aborted",
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, GateResponse::Executed(_))
    }
}

/// Result of one pass through the gate.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub request_id: String,
    pub response: GateResponse,
    /// The action executed but its outcome entry could not be written.
    /// Operator-only; not part of what callers see.
    pub audit_gap: bool,
}

impl GateOutcome {
    pub fn into_result(self) -> Result<Value, GateError> {
        match self.response {
            GateResponse::Executed(value) => Ok(value),
            GateResponse::Denied(Denial::Unauthenticated) => Err(GateError::Unauthenticated),
            GateResponse::Denied(Denial::Forbidden) => Err(GateError::Forbidden),
            GateResponse::Denied(Denial::RateLimited { retry_after }) => {
                Err(GateError::RateLimited { retry_after })
            }
            GateResponse::Denied(Denial::InvalidInput { violations }) => {
                Err(GateError::InvalidInput { violations })
            }
            GateResponse::Failed => Err(GateError::ActionFailed),
            GateResponse::Aborted => Err(GateError::Aborted),
        }
    }
}
