//! Forwarding allowed requests to the backend that owns the operation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

use crate::gate::{Action, ActionError, ActionRegistry, OperationRegistry};
use crate::identity::GateTicket;
use crate::validation::Sanitized;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// POSTs the sanitized payload to a fixed URL.
///
/// The acting identity travels in headers and, when `actor_field` is set, is
/// also written into the body. Callers cannot supply that field themselves:
/// it is not part of the schema.
pub struct UpstreamAction {
    client: reqwest::Client,
    url: Url,
    actor_field: Option<String>,
}

impl UpstreamAction {
    pub fn new(client: reqwest::Client, url: Url, actor_field: Option<String>) -> Self {
        Self {
            client,
            url,
            actor_field,
        }
    }
}

#[async_trait]
impl Action for UpstreamAction {
    async fn execute(&self, ticket: &GateTicket, input: Sanitized) -> Result<Value, ActionError> {
        let identity = ticket.identity();
        let mut body: Map<String, Value> = input.into_map();
        if let Some(field) = &self.actor_field {
            body.insert(field.clone(), Value::String(identity.subject.clone()));
        }

        let res = self
            .client
            .post(self.url.clone())
            .header(ACTOR_ID_HEADER, identity.subject.as_str())
            .header(ACTOR_ROLE_HEADER, identity.role.as_str())
            .header(REQUEST_ID_HEADER, ticket.request_id())
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(ActionError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| ActionError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }
}

/// An [`UpstreamAction`] for every operation with an `upstream`.
pub fn register_upstream_actions(
    registry: &OperationRegistry,
    actions: &mut ActionRegistry,
    client: &reqwest::Client,
) {
    for op in registry.iter() {
        if let Some(url) = &op.upstream {
            actions.register(
                op.name.clone(),
                Arc::new(UpstreamAction::new(client.clone(), url.clone(), op.actor_field.clone())),
            );
        }
    }
}
