//! Audit sink seam and the in-memory sink.

use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::audit::entry::{AuditEntry, AuditQuery};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audit sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit log corrupt at line {line}: {reason}")]
    CorruptLog { line: usize, reason: String },

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only storage for audit entries.
///
/// `append` must not return `Ok` until the entry is durable.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), SinkError>;

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, SinkError>;
}

/// Keeps entries in process memory. For tests and for deployments that have
/// not configured `audit.path`.
#[derive(Default)]
pub struct MemorySink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot in append order. Readable even after a writer panicked.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), SinkError> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .push(entry.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, SinkError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(query.apply(entries.iter()))
    }
}

fn poisoned() -> SinkError {
    SinkError::Unavailable("memory sink lock poisoned".into())
}
