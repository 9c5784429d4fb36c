//! End-to-end behaviour of the gate pipeline against in-memory collaborators.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use admin_gate::audit::{AuditOutcome, MemorySink};
use admin_gate::gate::{ActionRegistry, Denial, GateRequest, GateResponse};
use admin_gate::identity::Credentials;
use admin_gate::validation::ViolationRule;

mod common;
use common::*;

#[tokio::test]
async fn test_unauthenticated_request_is_denied_and_audited() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let request = GateRequest::new(TOPICS_CREATE, Credentials::anonymous(), valid_topic());
    let outcome = h.gate.handle(request, action.as_ref()).await;

    assert_eq!(outcome.response, GateResponse::Denied(Denial::Unauthenticated));
    assert_eq!(action.calls(), 0);

    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Denied);
    assert_eq!(entries[0].reason, "unauthenticated");
    assert_eq!(entries[0].context["detail"], "missing_credentials");
    assert!(entries[0].actor.is_none());
    assert_eq!(entries[0].request_id, outcome.request_id);
}

#[tokio::test]
async fn test_unknown_token_and_claim_mismatch_are_unauthenticated() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let outcome = h
        .gate
        .handle(
            GateRequest::new(TOPICS_CREATE, Credentials::bearer("stolen"), valid_topic()),
            action.as_ref(),
        )
        .await;
    assert_eq!(outcome.response, GateResponse::Denied(Denial::Unauthenticated));

    let outcome = h
        .gate
        .handle(
            GateRequest::new(
                TOPICS_CREATE,
                Credentials::bearer(ADMIN_TOKEN).with_claim("admin-2"),
                valid_topic(),
            ),
            action.as_ref(),
        )
        .await;
    assert_eq!(outcome.response, GateResponse::Denied(Denial::Unauthenticated));
    assert_eq!(h.entries_for(&outcome.request_id)[0].context["detail"], "identity_claim_mismatch");
    assert_eq!(action.calls(), 0);
}

#[tokio::test]
async fn test_wrong_role_is_forbidden_with_actor_recorded() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let request = GateRequest::new(TOPICS_CREATE, Credentials::bearer(CLIENT_TOKEN), valid_topic());
    let outcome = h.gate.handle(request, action.as_ref()).await;

    assert_eq!(outcome.response, GateResponse::Denied(Denial::Forbidden));
    assert_eq!(action.calls(), 0);

    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "forbidden");
    assert_eq!(entries[0].actor.as_ref().unwrap().subject, CLIENT_SUBJECT);
}

#[tokio::test]
async fn test_eleventh_request_in_window_is_rate_limited() {
    let h = Harness::new();
    let action = RecordingAction::new();

    for _ in 0..10 {
        let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;
        assert!(outcome.response.is_executed());
    }

    h.clock.advance(Duration::from_secs(15));
    let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;
    assert_eq!(
        outcome.response,
        GateResponse::Denied(Denial::RateLimited {
            retry_after: Duration::from_secs(45)
        })
    );
    assert_eq!(action.calls(), 10);

    let entry = &h.entries_for(&outcome.request_id)[0];
    assert_eq!(entry.reason, "rate_limited");
    assert_eq!(entry.context["retry_after_ms"], 45_000);

    // A different admin has their own quota.
    let other = GateRequest::new(TOPICS_CREATE, Credentials::bearer(SECOND_ADMIN_TOKEN), valid_topic());
    assert!(h.gate.handle(other, action.as_ref()).await.response.is_executed());

    // The next window starts from zero.
    h.clock.advance(Duration::from_secs(45));
    let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;
    assert!(outcome.response.is_executed());
}

#[tokio::test]
async fn test_missing_required_field_is_invalid_input() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let outcome = h
        .gate
        .handle(admin_request(TOPICS_CREATE, json!({ "priority": 3 })), action.as_ref())
        .await;

    match &outcome.response {
        GateResponse::Denied(Denial::InvalidInput { violations }) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].field, "topic");
            assert_eq!(violations[0].rule, ViolationRule::Missing);
        }
        other => panic!("expected invalid input, got {:?}", other),
    }
    assert_eq!(action.calls(), 0);

    let entry = &h.entries_for(&outcome.request_id)[0];
    assert_eq!(entry.reason, "invalid_input");
    assert_eq!(entry.context["violations"][0]["field"], "topic");
    assert_eq!(entry.context["violations"][0]["rule"], "missing");
}

#[tokio::test]
async fn test_valid_request_executes_with_sanitized_input() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;

    let expected = json!({ "topic": "Q3 launch", "priority": 2, "channel": "linkedin" });
    assert_eq!(outcome.response, GateResponse::Executed(json!({ "created": expected })));
    assert!(!outcome.audit_gap);
    assert_eq!(action.calls(), 1);
    assert_eq!(action.inputs()[0], (ADMIN_SUBJECT.to_string(), expected));

    let entries = h.entries_for(&outcome.request_id);
    assert_eq!(entries.len(), 2);
    assert_eq!(count_outcome(&entries, AuditOutcome::Allowed), 1);
    assert_eq!(count_outcome(&entries, AuditOutcome::Executed), 1);

    let executed = entries.iter().find(|e| e.outcome == AuditOutcome::Executed).unwrap();
    assert_eq!(executed.reason, "ok");
    assert_eq!(executed.target_type, "topic");
    assert_eq!(executed.target_id.as_deref(), Some("Q3 launch"));
    assert!(entries[0].sequence < entries[1].sequence);
}

#[tokio::test]
async fn test_rate_limit_runs_before_validation() {
    let h = Harness::new();
    let action = RecordingAction::new();

    for _ in 0..10 {
        let outcome = h
            .gate
            .handle(admin_request(TOPICS_CREATE, json!("not an object")), action.as_ref())
            .await;
        assert!(matches!(
            outcome.response,
            GateResponse::Denied(Denial::InvalidInput { .. })
        ));
    }

    let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;
    assert!(matches!(
        outcome.response,
        GateResponse::Denied(Denial::RateLimited { .. })
    ));
    assert_eq!(action.calls(), 0);
}

#[tokio::test]
async fn test_unknown_operation_fails_closed() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let outcome = h
        .gate
        .handle(admin_request("users.delete_all", json!({})), action.as_ref())
        .await;

    assert_eq!(outcome.response, GateResponse::Denied(Denial::Forbidden));
    assert_eq!(action.calls(), 0);
    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "users.delete_all");
    assert_eq!(entries[0].context["detail"], "unknown_operation");
}

#[tokio::test]
async fn test_action_failure_is_generic_and_cause_is_audited() {
    let h = Harness::new();

    let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), &FailingAction).await;
    assert_eq!(outcome.response, GateResponse::Failed);

    let entries = h.entries_for(&outcome.request_id);
    assert_eq!(entries.len(), 2);
    let failed = entries.iter().find(|e| e.outcome == AuditOutcome::Failed).unwrap();
    assert_eq!(failed.reason, "action_failed");
    assert_eq!(failed.context["error"], "upstream returned status 500");
}

#[tokio::test]
async fn test_action_timeout_is_aborted_and_audited() {
    let h = Harness::new();

    let outcome = h
        .gate
        .handle(admin_request(SLOW_OP, json!({})), &SlowAction(Duration::from_secs(5)))
        .await;
    assert_eq!(outcome.response, GateResponse::Aborted);

    let entries = h.entries_for(&outcome.request_id);
    let aborted = entries.iter().find(|e| e.outcome == AuditOutcome::Aborted).unwrap();
    assert_eq!(aborted.reason, "request_timeout");
    assert_eq!(aborted.context["timeout_ms"], 50);
}

#[tokio::test]
async fn test_cancelled_request_is_audited_as_aborted() {
    let h = Harness::new();
    let request = admin_request(TOPICS_CREATE, valid_topic());
    let request_id = request.request_id.clone();

    let gate = h.gate.clone();
    let task = tokio::spawn(async move {
        gate.handle(request, &SlowAction(Duration::from_secs(3))).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    // The aborted entry is written from a detached task.
    for _ in 0..100 {
        if h.entries_for(&request_id).len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let entries = h.entries_for(&request_id);
    let outcomes: Vec<AuditOutcome> = entries.iter().map(|e| e.outcome).collect();
    assert_eq!(outcomes, vec![AuditOutcome::Allowed, AuditOutcome::Aborted]);
    assert_eq!(entries[1].reason, "request_cancelled");
    assert_eq!(entries[1].actor.as_ref().unwrap().subject, ADMIN_SUBJECT);
    assert_eq!(entries[1].target_id.as_deref(), Some("Q3 launch"));
}

#[tokio::test]
async fn test_completed_request_writes_no_cancellation_entry() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let outcome = h.gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let outcomes: Vec<AuditOutcome> = h
        .entries_for(&outcome.request_id)
        .iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(outcomes, vec![AuditOutcome::Allowed, AuditOutcome::Executed]);
}

#[tokio::test]
async fn test_denial_still_denies_when_audit_write_fails() {
    let (gate, _clock) = build_gate(Arc::new(FailingSink));
    let action = RecordingAction::new();

    let outcome = gate
        .handle(
            GateRequest::new(TOPICS_CREATE, Credentials::anonymous(), valid_topic()),
            action.as_ref(),
        )
        .await;

    assert_eq!(outcome.response, GateResponse::Denied(Denial::Unauthenticated));
    assert!(!outcome.audit_gap);
    assert_eq!(action.calls(), 0);
}

#[tokio::test]
async fn test_outcome_write_failure_is_an_audit_gap() {
    let sink = Arc::new(OutcomeFailingSink::default());
    let (gate, _clock) = build_gate(sink.clone());
    let action = RecordingAction::new();

    let outcome = gate.handle(admin_request(TOPICS_CREATE, valid_topic()), action.as_ref()).await;

    // The action already ran; the caller still sees success.
    assert!(outcome.response.is_executed());
    assert!(outcome.audit_gap);
    assert_eq!(action.calls(), 1);

    let entries = sink.inner.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Allowed);
}

#[tokio::test]
async fn test_every_request_has_exactly_one_decision_entry() {
    let h = Harness::new();
    let action = RecordingAction::new();

    let requests = vec![
        GateRequest::new(TOPICS_CREATE, Credentials::anonymous(), valid_topic()),
        GateRequest::new(TOPICS_CREATE, Credentials::bearer(CLIENT_TOKEN), valid_topic()),
        admin_request(TOPICS_CREATE, json!({ "topic": "ok topic", "extra": true })),
        admin_request(TOPICS_CREATE, valid_topic()),
        admin_request("missing.op", Value::Null),
    ];

    let mut expected = Vec::new();
    for request in requests {
        let outcome = h.gate.handle(request, action.as_ref()).await;
        expected.push((outcome.request_id.clone(), outcome.response.clone()));
    }

    for (request_id, response) in expected {
        let decisions: Vec<_> = h
            .entries_for(&request_id)
            .into_iter()
            .filter(|e| e.outcome.is_decision())
            .collect();
        assert_eq!(decisions.len(), 1, "request {} has {:?}", request_id, decisions);

        let decision = &decisions[0];
        match response {
            GateResponse::Denied(denial) => {
                assert_eq!(decision.outcome, AuditOutcome::Denied);
                assert_eq!(decision.reason, denial.reason_code());
            }
            _ => {
                assert_eq!(decision.outcome, AuditOutcome::Allowed);
                assert_eq!(decision.reason, "authorized");
            }
        }
    }
}

#[tokio::test]
async fn test_dispatch_uses_registered_action() {
    let h = Harness::new();
    let action = RecordingAction::new();
    let actions = ActionRegistry::new().with(TOPICS_CREATE, action.clone());

    let outcome = h.gate.dispatch(admin_request(TOPICS_CREATE, valid_topic()), &actions).await;
    assert!(outcome.response.is_executed());
    assert_eq!(action.calls(), 1);

    // Declared operation, but nothing registered to run it.
    let outcome = h.gate.dispatch(admin_request(SLOW_OP, json!({})), &actions).await;
    assert_eq!(outcome.response, GateResponse::Failed);
}

#[tokio::test]
async fn test_audit_query_operation_reads_the_trail() {
    let h = Harness::new();
    let mut actions = ActionRegistry::new();
    admin_gate::gate::register_builtin_actions(&mut actions, h.gate.audit().clone());

    h.gate
        .handle(
            GateRequest::new(TOPICS_CREATE, Credentials::bearer(CLIENT_TOKEN), valid_topic()),
            &FailingAction,
        )
        .await;

    let query = GateRequest::new(
        "audit.query",
        Credentials::bearer(ADMIN_TOKEN),
        json!({ "actor": CLIENT_SUBJECT, "outcome": "denied" }),
    );
    let outcome = h.gate.dispatch(query, &actions).await;

    let result = outcome.into_result().unwrap();
    assert_eq!(result["count"], 1);
    assert_eq!(result["entries"][0]["reason"], "forbidden");

    // The query itself is audited.
    let trail = h.entries();
    assert!(trail
        .iter()
        .any(|e| e.action == "audit.query" && e.outcome == AuditOutcome::Executed));

    // Clients cannot read the trail.
    let denied = h
        .gate
        .dispatch(
            GateRequest::new("audit.query", Credentials::bearer(CLIENT_TOKEN), json!({})),
            &actions,
        )
        .await;
    assert_eq!(denied.response, GateResponse::Denied(Denial::Forbidden));
}

#[tokio::test]
async fn test_memory_sink_is_shared_with_harness() {
    let sink = Arc::new(MemorySink::new());
    let (gate, _clock) = build_gate(sink.clone());
    gate.handle(admin_request(TOPICS_CREATE, valid_topic()), &FailingAction)
        .await;
    assert_eq!(sink.len(), 2);
}
