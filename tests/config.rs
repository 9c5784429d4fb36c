//! The shipped sample configuration loads and drives a working gate.

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use admin_gate::audit::{AuditLogger, AuditOutcome, MemorySink};
use admin_gate::clock::{Clock, ManualClock};
use admin_gate::config::{load_config, parse_config, ConfigError, LogFormat};
use admin_gate::gate::{Denial, Gate, GateRequest, GateResponse};
use admin_gate::identity::{Credentials, Role};

mod common;
use common::{RecordingAction, EPOCH_START};

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/admin-gate.example.toml")
}

fn sample_gate() -> (Gate, Arc<MemorySink>) {
    let config = load_config(&sample_path()).unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(EPOCH_START));
    let audit = Arc::new(AuditLogger::new(sink.clone(), clock.clone(), Duration::from_secs(1)));
    (Gate::from_config(&config, audit, clock).unwrap(), sink)
}

#[test]
fn test_sample_config_loads() {
    let config = load_config(&sample_path()).unwrap();

    assert_eq!(config.identity.sessions.len(), 3);
    assert_eq!(config.identity.sessions[0].role, Role::SuperAdmin);
    assert!(config.identity.sessions[1].valid_until.is_some());
    assert_eq!(config.observability.log_format, LogFormat::Json);
    assert_eq!(config.operations.len(), 3);
}

#[test]
fn test_sample_operations_compile() {
    let (gate, _) = sample_gate();
    let registry = gate.registry();

    assert_eq!(registry.names(), vec!["audit.query", "clients.suspend", "topics.create"]);

    let topics = registry.get("topics.create").unwrap();
    assert_eq!(topics.schema.version, 2);
    assert_eq!(registry.rate_limit_for(&topics).limit, 20);
    assert_eq!(registry.rate_limit_for(&topics).window, Duration::from_secs(60));
    assert!(topics.roles.contains(Role::SuperAdmin));
    assert!(!topics.roles.contains(Role::Client));

    let suspend = registry.get("clients.suspend").unwrap();
    assert_eq!(suspend.target_type, "client");
    assert_eq!(registry.rate_limit_for(&suspend).window, Duration::from_secs(3600));
    assert_eq!(registry.timeout_for(&suspend), Duration::from_secs(3));

    // Roles overridden, builtin filters kept.
    let audit = registry.get("audit.query").unwrap();
    assert!(!audit.roles.contains(Role::Admin));
    assert!(audit.schema.declares("outcome"));
}

#[tokio::test]
async fn test_sample_gate_admits_admin_topic() {
    let (gate, sink) = sample_gate();
    let action = RecordingAction::new();

    let request = GateRequest::new(
        "topics.create",
        Credentials::bearer("change-me-admin"),
        json!({ "topic": "Spring campaign", "priority": 3 }),
    );
    let outcome = gate.handle(request, action.as_ref()).await;

    assert!(outcome.response.is_executed());
    assert_eq!(action.inputs()[0].0, "ops-1");
    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].outcome, AuditOutcome::Executed);
    assert_eq!(entries[1].target_id.as_deref(), Some("Spring campaign"));
}

#[tokio::test]
async fn test_sample_gate_keeps_suspend_for_super_admins() {
    let (gate, _) = sample_gate();
    let action = RecordingAction::new();
    let payload = json!({
        "client_id": "6f1c2e7a-4b8d-4c1e-9f3a-2d5b7c9e0a11",
        "reason": "chargeback fraud",
    });

    let denied = gate
        .handle(
            GateRequest::new("clients.suspend", Credentials::bearer("change-me-admin"), payload.clone()),
            action.as_ref(),
        )
        .await;
    assert_eq!(denied.response, GateResponse::Denied(Denial::Forbidden));

    let allowed = gate
        .handle(
            GateRequest::new("clients.suspend", Credentials::bearer("change-me-super"), payload),
            action.as_ref(),
        )
        .await;
    assert!(allowed.response.is_executed());
    assert_eq!(action.calls(), 1);
}

#[test]
fn test_invalid_config_reports_every_problem() {
    let err = parse_config(
        r#"
        [rate_limit]
        default_limit = 0

        [[operations]]
        name = "topics.create"

        [[operations]]
        name = "topics.create"
        min_role = "admin"
        upstream = "ftp://example.com/topics"
        "#,
    )
    .unwrap_err();

    let ConfigError::Validation(errors) = err else {
        panic!("expected validation errors");
    };
    let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
    assert!(paths.contains(&"rate_limit.default_limit"));
    assert!(paths.iter().any(|p| p.starts_with("operations[0]")));
    assert!(paths.iter().any(|p| p.starts_with("operations[1]")));
}
