//! Audit records and the query contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::identity::{Identity, Role};

/// Result recorded by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Passed every gate stage; the action is about to run.
    Allowed,
    /// Stopped by a gate stage.
    Denied,
    /// The action ran and succeeded.
    Executed,
    /// The action ran and returned an error.
    Failed,
    /// The request timed out or was cancelled before the action finished.
    Aborted,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Allowed => "allowed",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Executed => "executed",
            AuditOutcome::Failed => "failed",
            AuditOutcome::Aborted => "aborted",
        }
    }

    /// Decision entries are written before any action runs.
    pub fn is_decision(&self) -> bool {
        matches!(self, AuditOutcome::Allowed | AuditOutcome::Denied)
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub subject: String,
    pub role: Role,
}

impl From<&Identity> for Actor {
    fn from(identity: &Identity) -> Self {
        Self {
            subject: identity.subject.clone(),
            role: identity.role,
        }
    }
}

/// An entry before the logger stamps id, sequence and timestamp.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub request_id: String,
    pub actor: Option<Actor>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub outcome: AuditOutcome,
    pub reason: String,
    pub context: Map<String, Value>,
}

impl AuditDraft {
    pub fn new(
        request_id: impl Into<String>,
        action: impl Into<String>,
        outcome: AuditOutcome,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            actor: None,
            action: action.into(),
            target_type: String::new(),
            target_id: None,
            outcome,
            reason: reason.into(),
            context: Map::new(),
        }
    }

    pub fn actor(mut self, actor: Option<Actor>) -> Self {
        self.actor = actor;
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: Option<String>) -> Self {
        self.target_type = target_type.into();
        self.target_id = target_id;
        self
    }

    pub fn context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn stamp(self, id: Uuid, sequence: u64, timestamp: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id,
            sequence,
            timestamp,
            request_id: self.request_id,
            actor: self.actor,
            action: self.action,
            target_type: self.target_type,
            target_id: self.target_id,
            outcome: self.outcome,
            reason: self.reason,
            context: Value::Object(self.context),
        }
    }
}

/// A persisted audit record. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub actor: Option<Actor>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub outcome: AuditOutcome,
    pub reason: String,
    pub context: Value,
}

impl AuditEntry {
    /// Total order for consumers: timestamp, then sequence.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }
}

/// Read-side filter. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AuditOutcome>,
    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = &self.actor {
            if entry.actor.as_ref().map(|a| &a.subject) != Some(actor) {
                return false;
            }
        }
        if self.action.as_ref().is_some_and(|a| a != &entry.action) {
            return false;
        }
        if self.target_type.as_ref().is_some_and(|t| t != &entry.target_type) {
            return false;
        }
        if let Some(target_id) = &self.target_id {
            if entry.target_id.as_ref() != Some(target_id) {
                return false;
            }
        }
        if self.outcome.is_some_and(|o| o != entry.outcome) {
            return false;
        }
        if self.from.is_some_and(|from| entry.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.timestamp >= to) {
            return false;
        }
        true
    }

    /// Filter, sort by (timestamp, sequence) and apply `limit`.
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        let mut out: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        out.sort_by_key(AuditEntry::order_key);
        if let Some(limit) = self.limit {
            let skip = out.len().saturating_sub(limit);
            out.drain(..skip);
        }
        out
    }
}
