//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use admin_gate::audit::{AuditEntry, AuditLogger, AuditOutcome, AuditQuery, AuditSink, MemorySink, SinkError};
use admin_gate::clock::{Clock, ManualClock};
use admin_gate::gate::{
    Action, ActionError, Gate, GateRequest, OperationRegistry, ProtectedOperation,
};
use admin_gate::identity::{
    Credentials, GateTicket, Identity, IdentityGate, Role, RoleSet, SessionWindow,
    StaticCredentialStore,
};
use admin_gate::security::rate_limit::{RateLimitPolicy, RateLimiter};
use admin_gate::validation::{FieldRule, Sanitized, Schema};

pub const ADMIN_TOKEN: &str = "admin-token";
pub const ADMIN_SUBJECT: &str = "admin-1";
pub const SECOND_ADMIN_TOKEN: &str = "admin-token-2";
pub const CLIENT_TOKEN: &str = "client-token";
pub const CLIENT_SUBJECT: &str = "client-1";

pub const TOPICS_CREATE: &str = "topics.create";
pub const SLOW_OP: &str = "reports.generate";

/// Start of a one-minute window.
pub const EPOCH_START: Duration = Duration::from_secs(1_800_000_000);

pub fn topic_schema() -> Schema {
    Schema::new(TOPICS_CREATE, 1)
        .field(FieldRule::string("topic").required().min_length(3).max_length(80))
        .field(FieldRule::numeric("priority").min(1.0).max(5.0))
        .field(FieldRule::string("channel").one_of(["email", "instagram", "linkedin"]))
}

pub fn registry() -> OperationRegistry {
    OperationRegistry::new(RateLimitPolicy::per_minute(10), Duration::from_secs(5))
        .with(
            ProtectedOperation::new(TOPICS_CREATE, RoleSet::at_least(Role::Admin), topic_schema())
                .target("topic", Some("topic")),
        )
        .with(
            ProtectedOperation::new(SLOW_OP, RoleSet::at_least(Role::Admin), Schema::new(SLOW_OP, 1))
                .timeout(Duration::from_millis(50)),
        )
        .with(admin_gate::gate::builtin::audit_query_operation())
}

pub fn credential_store() -> StaticCredentialStore {
    let mut store = StaticCredentialStore::new();
    for (token, subject, role) in [
        (ADMIN_TOKEN, ADMIN_SUBJECT, Role::Admin),
        (SECOND_ADMIN_TOKEN, "admin-2", Role::SuperAdmin),
        (CLIENT_TOKEN, CLIENT_SUBJECT, Role::Client),
    ] {
        store.insert(
            token,
            Identity {
                subject: subject.to_string(),
                role,
                session: SessionWindow::default(),
            },
        );
    }
    store
}

pub struct Harness {
    pub gate: Arc<Gate>,
    pub sink: Arc<MemorySink>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let sink = Arc::new(MemorySink::new());
        let (gate, clock) = build_gate(sink.clone());
        Self { gate, sink, clock }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.sink.entries()
    }

    pub fn entries_for(&self, request_id: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.request_id == request_id)
            .collect()
    }
}

pub fn build_gate(sink: Arc<dyn AuditSink>) -> (Arc<Gate>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(EPOCH_START));
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let identity = IdentityGate::new(
        Arc::new(credential_store()),
        dyn_clock.clone(),
        Duration::from_millis(200),
    );
    let audit = Arc::new(AuditLogger::new(sink, dyn_clock.clone(), Duration::from_millis(200)));
    let gate = Gate::new(
        Arc::new(registry()),
        identity,
        Arc::new(RateLimiter::new(2)),
        audit,
        dyn_clock,
    );
    (Arc::new(gate), clock)
}

pub fn admin_request(operation: &str, payload: Value) -> GateRequest {
    GateRequest::new(operation, Credentials::bearer(ADMIN_TOKEN), payload)
}

pub fn valid_topic() -> Value {
    json!({ "topic": "  Q3 launch  ", "priority": "2", "channel": "linkedin" })
}

/// Records every invocation and echoes the sanitized input.
#[derive(Default)]
pub struct RecordingAction {
    calls: AtomicUsize,
    inputs: Mutex<Vec<(String, Value)>>,
}

impl RecordingAction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (subject, input) of every call.
    pub fn inputs(&self) -> Vec<(String, Value)> {
        self.inputs.lock().expect("inputs lock poisoned").clone()
    }
}

#[async_trait]
impl Action for RecordingAction {
    async fn execute(&self, ticket: &GateTicket, input: Sanitized) -> Result<Value, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = input.into_value();
        self.inputs
            .lock()
            .expect("inputs lock poisoned")
            .push((ticket.identity().subject.clone(), value.clone()));
        Ok(json!({ "created": value }))
    }
}

pub struct FailingAction;

#[async_trait]
impl Action for FailingAction {
    async fn execute(&self, _ticket: &GateTicket, _input: Sanitized) -> Result<Value, ActionError> {
        Err(ActionError::UpstreamStatus { status: 500 })
    }
}

pub struct SlowAction(pub Duration);

#[async_trait]
impl Action for SlowAction {
    async fn execute(&self, _ticket: &GateTicket, _input: Sanitized) -> Result<Value, ActionError> {
        tokio::time::sleep(self.0).await;
        Ok(json!({}))
    }
}

/// Refuses every append.
pub struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn append(&self, _entry: &AuditEntry) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("audit store offline".into()))
    }

    async fn query(&self, _query: &AuditQuery) -> Result<Vec<AuditEntry>, SinkError> {
        Err(SinkError::Unavailable("audit store offline".into()))
    }
}

/// Accepts decision entries, refuses everything written after an action ran.
#[derive(Default)]
pub struct OutcomeFailingSink {
    pub inner: MemorySink,
}

#[async_trait]
impl AuditSink for OutcomeFailingSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), SinkError> {
        if entry.outcome.is_decision() {
            self.inner.append(entry).await
        } else {
            Err(SinkError::Unavailable("write quorum lost".into()))
        }
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, SinkError> {
        self.inner.query(query).await
    }
}

pub fn count_outcome(entries: &[AuditEntry], outcome: AuditOutcome) -> usize {
    entries.iter().filter(|e| e.outcome == outcome).count()
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;

                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Drain one HTTP/1.1 request (headers and Content-Length body).
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);

        let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= header_end + 4 + content_length {
            return;
        }
    }
}
