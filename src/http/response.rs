//! Mapping gate outcomes onto HTTP.
//!
//! | response                | status |
//! |-------------------------|--------|
//! | executed                | 200    |
//! | denied: unauthenticated | 401    |
//! | denied: forbidden       | 403    |
//! | denied: rate limited    | 429    |
//! | denied: invalid input   | 422    |
//! | failed                  | 502    |
//! | aborted                 | 504    |

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

use crate::gate::{Denial, GateOutcome, GateResponse};

/// `Retry-After` carries whole seconds, rounded up so a client that waits
/// exactly that long lands in the next window.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let millis = retry_after.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

impl IntoResponse for GateOutcome {
    fn into_response(self) -> Response {
        let request_id = self.request_id;
        match self.response {
            GateResponse::Executed(result) => (
                StatusCode::OK,
                Json(json!({
                    "status": "executed",
                    "request_id": request_id,
                    "result": result,
                })),
            )
                .into_response(),
            GateResponse::Denied(denial) => denial_response(&request_id, denial),
            GateResponse::Failed => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "status": "failed",
                    "request_id": request_id,
                })),
            )
                .into_response(),
            GateResponse::Aborted => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "status": "aborted",
                    "request_id": request_id,
                })),
            )
                .into_response(),
        }
    }
}

fn denial_response(request_id: &str, denial: Denial) -> Response {
    let reason = denial.reason_code();
    match denial {
        Denial::Unauthenticated => {
            let mut res = (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "denied", "reason": reason, "request_id": request_id })),
            )
                .into_response();
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            res
        }
        Denial::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(json!({ "status": "denied", "reason": reason, "request_id": request_id })),
        )
            .into_response(),
        Denial::RateLimited { retry_after } => {
            let secs = retry_after_secs(retry_after);
            let mut res = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "status": "denied",
                    "reason": reason,
                    "request_id": request_id,
                    "retry_after_secs": secs,
                })),
            )
                .into_response();
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            res
        }
        Denial::InvalidInput { violations } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "status": "denied",
                "reason": reason,
                "request_id": request_id,
                "violations": violations,
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1000)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(44_001)), 45);
    }

    #[test]
    fn test_status_mapping() {
        let outcome = |response| GateOutcome {
            request_id: "r".into(),
            response,
            audit_gap: false,
        };

        let cases = [
            (GateResponse::Executed(json!({})), StatusCode::OK),
            (GateResponse::Denied(Denial::Unauthenticated), StatusCode::UNAUTHORIZED),
            (GateResponse::Denied(Denial::Forbidden), StatusCode::FORBIDDEN),
            (
                GateResponse::Denied(Denial::InvalidInput { violations: vec![] }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (GateResponse::Failed, StatusCode::BAD_GATEWAY),
            (GateResponse::Aborted, StatusCode::GATEWAY_TIMEOUT),
        ];
        for (response, status) in cases {
            assert_eq!(outcome(response).into_response().status(), status);
        }

        let limited = outcome(GateResponse::Denied(Denial::RateLimited {
            retry_after: Duration::from_millis(2_500),
        }))
        .into_response();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[header::RETRY_AFTER], "3");
    }
}
