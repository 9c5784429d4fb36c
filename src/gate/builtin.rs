//! The audit read side, served as a gated operation.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::audit::{AuditLogger, AuditQuery};
use crate::gate::action::{Action, ActionError, ActionRegistry};
use crate::gate::operation::ProtectedOperation;
use crate::identity::{GateTicket, Role, RoleSet};
use crate::validation::{FieldKind, FieldRule, Sanitized, Schema};

pub const AUDIT_QUERY_OPERATION: &str = "audit.query";

/// Page size when the caller does not pass `limit`.
pub const DEFAULT_AUDIT_PAGE: usize = 100;
const MAX_AUDIT_PAGE: f64 = 1000.0;

const OUTCOMES: [&str; 5] = ["allowed", "denied", "executed", "failed", "aborted"];

/// Filters accepted by `GET /audit`. Query strings carry text only, so
/// `limit` is numeric and the bounds are timestamps.
pub fn audit_query_schema() -> Schema {
    Schema::new(AUDIT_QUERY_OPERATION, 1)
        .field(FieldRule::string("actor").max_length(200))
        .field(FieldRule::string("action").max_length(200))
        .field(FieldRule::string("target_type").max_length(200))
        .field(FieldRule::string("target_id").max_length(200))
        .field(FieldRule::string("outcome").one_of(OUTCOMES))
        .field(FieldRule::new("from", FieldKind::Timestamp))
        .field(FieldRule::new("to", FieldKind::Timestamp))
        .field(FieldRule::numeric("limit").min(1.0).max(MAX_AUDIT_PAGE).integral())
}

pub fn audit_query_operation() -> ProtectedOperation {
    ProtectedOperation::new(
        AUDIT_QUERY_OPERATION,
        RoleSet::from_roles([Role::SuperAdmin, Role::Admin]),
        audit_query_schema(),
    )
}

/// Runs an [`AuditQuery`] against the logger's sink.
pub struct AuditQueryAction {
    audit: Arc<AuditLogger>,
}

impl AuditQueryAction {
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl Action for AuditQueryAction {
    async fn execute(&self, _ticket: &GateTicket, input: Sanitized) -> Result<Value, ActionError> {
        let mut query: AuditQuery = serde_json::from_value(input.into_value())
            .map_err(|e| ActionError::Rejected(e.to_string()))?;
        if query.limit.is_none() {
            query.limit = Some(DEFAULT_AUDIT_PAGE);
        }

        let mut entries = self
            .audit
            .query(&query)
            .await
            .map_err(|e| ActionError::Unavailable(e.to_string()))?;
        // Newest first, as an operator reads a log.
        entries.reverse();

        Ok(json!({
            "count": entries.len(),
            "entries": entries,
        }))
    }
}

pub fn register_builtin_actions(actions: &mut ActionRegistry, audit: Arc<AuditLogger>) {
    actions.register(AUDIT_QUERY_OPERATION, Arc::new(AuditQueryAction::new(audit)));
}
