//! Route handlers. Each one builds a [`GateRequest`] and lets the gate decide.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::gate::{GateRequest, AUDIT_QUERY_OPERATION};
use crate::http::server::AppState;
use crate::http::upstream::REQUEST_ID_HEADER;
use crate::identity::Credentials;

/// Identity claim header checked against the bearer token's subject.
pub const SUBJECT_HEADER: &str = "x-subject-id";

/// `POST /ops/{operation}`
pub async fn invoke(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Unparsable JSON still goes through identity and rate limiting first;
    // validation then rejects it as a non-object payload.
    let payload = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    let request = gate_request(&headers, operation, payload);
    state.gate.dispatch(request, &state.actions).await.into_response()
}

/// `GET /audit?actor=..&action=..&target_type=..&outcome=..&from=..&to=..&limit=..`
pub async fn audit(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let payload: Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let request = gate_request(&headers, AUDIT_QUERY_OPERATION.to_string(), Value::Object(payload));
    state.gate.dispatch(request, &state.actions).await.into_response()
}

/// `GET /health`. Not gated.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "operations": state.gate.registry().names(),
        "rate_limit_counters": state.gate.limiter().len(),
    }))
}

/// The audit `request_id` is always minted here. The edge `x-request-id`
/// (client supplied or set by the request-id layer) rides along as the
/// correlation id, so a caller cannot reuse another request's audit id.
fn gate_request(headers: &HeaderMap, operation: String, payload: Value) -> GateRequest {
    let correlation_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut credentials = Credentials::from_authorization(
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
    );
    if let Some(claim) = headers.get(SUBJECT_HEADER).and_then(|v| v.to_str().ok()) {
        credentials = credentials.with_claim(claim);
    }

    GateRequest {
        request_id: Uuid::new_v4().to_string(),
        operation,
        credentials,
        payload,
        correlation_id,
    }
}
