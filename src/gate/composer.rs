//! The gate composer: one ordered pipeline for every protected operation.
//!
//! ```text
//! identity ─▶ rate limit ─▶ validation ─▶ action ─▶ audit(outcome)
//!     │            │             │
//!     └────────────┴─────────────┴──▶ audit(denied) ─▶ end
//! ```
//!
//! The first stage that rejects ends the request. Rate limiting runs before
//! validation so a flood of malformed payloads is throttled, not parsed.
//!
//! Once a request is allowed it always gets an outcome entry. If the caller
//! drops the request future (client disconnect) while the action runs, an
//! `aborted` entry with reason `request_cancelled` is written from a detached
//! task.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audit::{Actor, AuditDraft, AuditLogger, AuditOutcome};
use crate::clock::Clock;
use crate::config::{ConfigError, GateConfig};
use crate::gate::action::{Action, ActionRegistry, MissingAction};
use crate::gate::operation::{OperationRegistry, ProtectedOperation};
use crate::gate::response::{Denial, GateOutcome, GateResponse};
use crate::identity::{Credentials, GateTicket, IdentityGate, StaticCredentialStore};
use crate::observability::metrics;
use crate::security::rate_limit::{RateDecision, RateLimitKey, RateLimiter};
use crate::validation::{validate, Sanitized};

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identity,
    RateLimit,
    Validation,
    Action,
    Audit,
}

/// Fixed order every request goes through.
pub const STAGE_ORDER: [Stage; 5] = [
    Stage::Identity,
    Stage::RateLimit,
    Stage::Validation,
    Stage::Action,
    Stage::Audit,
];

/// One inbound call to a protected operation.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub request_id: String,
    pub operation: String,
    pub credentials: Credentials,
    pub payload: Value,
    /// Caller-chosen id, recorded in audit context but never used as
    /// `request_id`.
    pub correlation_id: Option<String>,
}

impl GateRequest {
    /// Fresh UUID v4 request id.
    pub fn new(operation: impl Into<String>, credentials: Credentials, payload: Value) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.into(),
            credentials,
            payload,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// A stage rejection, ready to be audited.
struct Rejection {
    denial: Denial,
    actor: Option<Actor>,
    detail: &'static str,
    context: Vec<(&'static str, Value)>,
}

impl Rejection {
    fn new(denial: Denial, actor: Option<Actor>, detail: &'static str) -> Self {
        Self {
            denial,
            actor,
            detail,
            context: Vec::new(),
        }
    }

    fn with(mut self, key: &'static str, value: Value) -> Self {
        self.context.push((key, value));
        self
    }
}

/// Writes an `aborted` outcome if dropped while armed.
struct CancelGuard {
    audit: Arc<AuditLogger>,
    pending: Option<AuditDraft>,
    start: Instant,
}

impl CancelGuard {
    fn disarm(&mut self) {
        self.pending = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let Some(draft) = self.pending.take() else {
            return;
        };
        tracing::warn!(
            request_id = %draft.request_id,
            operation = %draft.action,
            "Request cancelled while its action was running"
        );
        metrics::record_decision(&draft.action, "aborted", self.start);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let audit = self.audit.clone();
                runtime.spawn(async move {
                    let _ = audit.record_outcome(draft).await;
                });
            }
            Err(_) => tracing::error!(
                audit_gap = true,
                request_id = %draft.request_id,
                operation = %draft.action,
                "No runtime left to record the cancelled request"
            ),
        }
    }
}

/// Everything that passed the gate stages.
struct Admitted {
    ticket: GateTicket,
    input: Sanitized,
    target_id: Option<String>,
}

pub struct Gate {
    registry: Arc<OperationRegistry>,
    identity: IdentityGate,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLogger>,
    clock: Arc<dyn Clock>,
}

impl Gate {
    pub fn new(
        registry: Arc<OperationRegistry>,
        identity: IdentityGate,
        limiter: Arc<RateLimiter>,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            identity,
            limiter,
            audit,
            clock,
        }
    }

    /// Build the gate from validated configuration. The audit logger is
    /// passed in because opening its sink is the caller's decision.
    pub fn from_config(
        config: &GateConfig,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(OperationRegistry::from_config(config)?);
        let store = Arc::new(StaticCredentialStore::from_config(&config.identity.sessions));
        let identity = IdentityGate::new(
            store,
            clock.clone(),
            Duration::from_millis(config.identity.lookup_timeout_ms),
        );
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.idle_windows));
        Ok(Self::new(registry, identity, limiter, audit, clock))
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Run the action registered for the request's operation.
    pub async fn dispatch(&self, request: GateRequest, actions: &ActionRegistry) -> GateOutcome {
        match actions.get(&request.operation) {
            Some(action) => self.handle(request, action.as_ref()).await,
            None => self.handle(request, &MissingAction).await,
        }
    }

    /// Run one request through every stage and `action` if all pass.
    pub async fn handle(&self, request: GateRequest, action: &dyn Action) -> GateOutcome {
        let start = Instant::now();
        let request_id = request.request_id.clone();

        let Some(op) = self.registry.get(&request.operation) else {
            tracing::warn!(
                request_id = %request_id,
                operation = %request.operation,
                "Request for unknown operation"
            );
            let draft = AuditDraft::new(
                &request_id,
                &request.operation,
                AuditOutcome::Denied,
                Denial::Forbidden.reason_code(),
            )
            .target("unknown", None)
            .context("detail", "unknown_operation");
            let draft = correlated(draft, &request);
            self.audit.record_decision(draft).await;
            metrics::record_decision(&request.operation, "denied", start);
            return GateOutcome {
                request_id,
                response: GateResponse::Denied(Denial::Forbidden),
                audit_gap: false,
            };
        };

        let admitted = match self.admit(&op, &request).await {
            Ok(admitted) => admitted,
            Err(rejection) => return self.deny(&op, &request, rejection, start).await,
        };

        let ticket = admitted.ticket;
        let actor = Actor::from(ticket.identity());
        let schema_version = op.schema.version;

        let outcome_draft = |outcome: AuditOutcome, reason: &str| {
            let draft = AuditDraft::new(&request_id, &op.name, outcome, reason)
                .actor(Some(actor.clone()))
                .target(&op.target_type, admitted.target_id.clone())
                .context("schema_version", schema_version);
            correlated(draft, &request)
        };

        // Armed before the allowed entry: from here on the request ends with
        // exactly one outcome entry even if this future is dropped.
        let mut guard = CancelGuard {
            audit: self.audit.clone(),
            pending: Some(outcome_draft(AuditOutcome::Aborted, "request_cancelled")),
            start,
        };

        self.audit
            .record_decision(outcome_draft(AuditOutcome::Allowed, "authorized"))
            .await;

        tracing::debug!(
            request_id = %request_id,
            operation = %op.name,
            subject = %actor.subject,
            "Request allowed"
        );

        let timeout = self.registry.timeout_for(&op);
        let (response, outcome, reason, cause) =
            match tokio::time::timeout(timeout, action.execute(&ticket, admitted.input)).await {
                Ok(Ok(value)) => (GateResponse::Executed(value), AuditOutcome::Executed, "ok", None),
                Ok(Err(e)) => {
                    tracing::warn!(
                        request_id = %request_id,
                        operation = %op.name,
                        error = %e,
                        "Action failed"
                    );
                    (GateResponse::Failed, AuditOutcome::Failed, "action_failed", Some(e.to_string()))
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %request_id,
                        operation = %op.name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Action timed out"
                    );
                    (GateResponse::Aborted, AuditOutcome::Aborted, "request_timeout", None)
                }
            };

        let mut draft = outcome_draft(outcome, reason);
        if let Some(cause) = cause {
            draft = draft.context("error", cause);
        }
        if outcome == AuditOutcome::Aborted {
            draft = draft.context("timeout_ms", timeout.as_millis() as u64);
        }

        // The outcome write runs detached so a cancellation here cannot lose it.
        guard.disarm();
        let audit = self.audit.clone();
        let audit_gap = match tokio::spawn(async move { audit.record_outcome(draft).await }).await {
            Ok(written) => written.is_err(),
            Err(e) => {
                tracing::error!(audit_gap = true, request_id = %request_id, error = %e, "Outcome write task failed");
                true
            }
        };

        metrics::record_decision(&op.name, response.label(), start);
        GateOutcome {
            request_id,
            response,
            audit_gap,
        }
    }

    /// Identity, rate limit and validation, in that order.
    async fn admit(&self, op: &ProtectedOperation, request: &GateRequest) -> Result<Admitted, Rejection> {
        let ticket = self
            .identity
            .verify(&request.request_id, &op.name, &request.credentials, &op.roles)
            .await
            .map_err(|rejection| {
                let denial = if rejection.failure.is_forbidden() {
                    Denial::Forbidden
                } else {
                    Denial::Unauthenticated
                };
                Rejection::new(
                    denial,
                    rejection.identity.as_ref().map(Actor::from),
                    rejection.failure.reason_code(),
                )
            })?;
        let actor = || Some(Actor::from(ticket.identity()));

        let policy = self.registry.rate_limit_for(op);
        let key = RateLimitKey::new(&ticket.identity().subject, &op.name);
        if let RateDecision::Reject { retry_after } = self.limiter.check(&key, policy, self.clock.now()) {
            metrics::record_rate_limited(&op.name);
            return Err(Rejection::new(Denial::RateLimited { retry_after }, actor(), "quota_exhausted")
                .with("retry_after_ms", json!(retry_after.as_millis() as u64))
                .with("limit", json!(policy.limit))
                .with("window_secs", json!(policy.window.as_secs())));
        }

        let input = match validate(&op.schema, &request.payload) {
            Ok(input) => input,
            Err(violations) => {
                metrics::record_validation_failure(&op.name);
                let listed = serde_json::to_value(&violations).unwrap_or(Value::Null);
                return Err(Rejection::new(Denial::InvalidInput { violations }, actor(), "schema_violation")
                    .with("schema", json!(op.schema.name))
                    .with("schema_version", json!(op.schema.version))
                    .with("violations", listed));
            }
        };

        let target_id = op
            .target_field
            .as_deref()
            .and_then(|field| input.get(field))
            .and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Ok(Admitted {
            ticket,
            input,
            target_id,
        })
    }

    async fn deny(
        &self,
        op: &ProtectedOperation,
        request: &GateRequest,
        rejection: Rejection,
        start: Instant,
    ) -> GateOutcome {
        let request_id = request.request_id.clone();
        let reason = rejection.denial.reason_code();
        tracing::warn!(
            request_id = %request_id,
            operation = %op.name,
            subject = rejection.actor.as_ref().map(|a| a.subject.as_str()).unwrap_or("-"),
            reason,
            detail = rejection.detail,
            "Request denied"
        );

        let mut draft = AuditDraft::new(&request_id, &op.name, AuditOutcome::Denied, reason)
            .actor(rejection.actor)
            .target(&op.target_type, None)
            .context("detail", rejection.detail);
        for (key, value) in rejection.context {
            draft = draft.context(key, value);
        }
        self.audit.record_decision(correlated(draft, request)).await;

        metrics::record_decision(&op.name, "denied", start);
        GateOutcome {
            request_id,
            response: GateResponse::Denied(rejection.denial),
            audit_gap: false,
        }
    }
}

fn correlated(draft: AuditDraft, request: &GateRequest) -> AuditDraft {
    match &request.correlation_id {
        Some(id) => draft.context("correlation_id", id.as_str()),
        None => draft,
    }
}
