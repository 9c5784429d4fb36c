//! Stamping, bounded durable writes, and failure escalation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::entry::{AuditDraft, AuditEntry, AuditQuery};
use crate::audit::sink::{AuditSink, SinkError};
use crate::clock::Clock;
use crate::error::GateError;
use crate::observability::metrics;

/// A durable write was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditAck {
    pub id: Uuid,
    pub sequence: u64,
}

#[derive(Debug, Error)]
pub enum AuditFailure {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("audit write timed out after {0:?}")]
    Timeout(Duration),
}

pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    write_timeout: Duration,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>, write_timeout: Duration) -> Self {
        Self {
            sink,
            clock,
            sequence: AtomicU64::new(0),
            write_timeout,
        }
    }

    /// Continue numbering after entries already in the sink.
    pub fn resume_after(self, last_sequence: u64) -> Self {
        self.sequence.store(last_sequence, Ordering::SeqCst);
        self
    }

    /// Stamp the draft and append it. `Ok` only once the sink reports it durable.
    pub async fn record(&self, draft: AuditDraft) -> Result<AuditAck, AuditFailure> {
        let entry = self.stamp(draft);
        let ack = AuditAck {
            id: entry.id,
            sequence: entry.sequence,
        };

        match tokio::time::timeout(self.write_timeout, self.sink.append(&entry)).await {
            Ok(Ok(())) => Ok(ack),
            Ok(Err(e)) => Err(AuditFailure::Sink(e)),
            Err(_) => Err(AuditFailure::Timeout(self.write_timeout)),
        }
    }

    /// Record a gate decision. A failed write is escalated but does not
    /// change the decision.
    pub async fn record_decision(&self, draft: AuditDraft) -> Option<AuditAck> {
        let request_id = draft.request_id.clone();
        let action = draft.action.clone();
        let outcome = draft.outcome;

        match self.record(draft).await {
            Ok(ack) => Some(ack),
            Err(e) => {
                tracing::error!(
                    alert = true,
                    request_id = %request_id,
                    operation = %action,
                    outcome = %outcome,
                    error = %e,
                    "Failed to write audit decision entry"
                );
                metrics::record_audit_write_failure("decision");
                None
            }
        }
    }

    /// Record what an executed action did. A failed write is an audit gap:
    /// the action already happened and is not undone.
    pub async fn record_outcome(&self, draft: AuditDraft) -> Result<AuditAck, GateError> {
        let request_id = draft.request_id.clone();
        let action = draft.action.clone();

        self.record(draft).await.map_err(|e| {
            tracing::error!(
                audit_gap = true,
                request_id = %request_id,
                operation = %action,
                error = %e,
                "Executed action has no durable outcome entry"
            );
            metrics::record_audit_write_failure("outcome");
            metrics::record_audit_gap(&action);
            GateError::AuditGap {
                request_id,
                operation: action,
            }
        })
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, SinkError> {
        self.sink.query(query).await
    }

    fn stamp(&self, draft: AuditDraft) -> AuditEntry {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        draft.stamp(Uuid::new_v4(), sequence, self.clock.now_utc())
    }
}
