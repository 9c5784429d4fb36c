//! Business actions behind the gate.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::identity::GateTicket;
use crate::validation::Sanitized;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("action rejected the request: {0}")]
    Rejected(String),

    #[error("no action available: {0}")]
    Unavailable(String),
}

/// Work performed once a request is allowed.
///
/// Receives the verified identity through the ticket and a payload that has
/// already passed validation.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ticket: &GateTicket, input: Sanitized) -> Result<Value, ActionError>;
}

/// Operation name to action.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(operation.into(), action);
    }

    pub fn with(mut self, operation: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.register(operation, action);
        self
    }

    pub fn get(&self, operation: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(operation).cloned()
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.actions.contains_key(operation)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Stands in for an operation nobody registered an action for.
pub(crate) struct MissingAction;

#[async_trait]
impl Action for MissingAction {
    async fn execute(&self, ticket: &GateTicket, _input: Sanitized) -> Result<Value, ActionError> {
        Err(ActionError::Unavailable(ticket.operation().to_string()))
    }
}
