//! Protected operation declarations and the registry the gate reads them from.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{ConfigError, GateConfig, OperationConfig, ValidationError};
use crate::gate::builtin;
use crate::identity::RoleSet;
use crate::security::rate_limit::RateLimitPolicy;
use crate::validation::Schema;

/// Everything the gate needs to know about one privileged operation.
#[derive(Debug, Clone)]
pub struct ProtectedOperation {
    pub name: String,
    pub roles: RoleSet,
    pub schema: Schema,
    /// `None` uses the registry fallback. Never unlimited.
    pub rate_limit: Option<RateLimitPolicy>,
    /// `None` uses the registry default.
    pub timeout: Option<Duration>,
    pub target_type: String,
    pub target_field: Option<String>,
    pub upstream: Option<Url>,
    pub actor_field: Option<String>,
}

impl ProtectedOperation {
    pub fn new(name: impl Into<String>, roles: RoleSet, schema: Schema) -> Self {
        let name = name.into();
        let target_type = default_target_type(&name);
        Self {
            name,
            roles,
            schema,
            rate_limit: None,
            timeout: None,
            target_type,
            target_field: None,
            upstream: None,
            actor_field: None,
        }
    }

    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_field: Option<&str>) -> Self {
        self.target_type = target_type.into();
        self.target_field = target_field.map(str::to_string);
        self
    }

    pub fn upstream(mut self, url: Url) -> Self {
        self.upstream = Some(url);
        self
    }

    pub fn actor_field(mut self, field: impl Into<String>) -> Self {
        self.actor_field = Some(field.into());
        self
    }

    fn from_config(
        config: &OperationConfig,
        path: &str,
        fallback_window: Duration,
    ) -> Result<Self, ConfigError> {
        let roles = match config.min_role {
            Some(min) => RoleSet::at_least(min),
            None => RoleSet::from_roles(config.roles.iter().copied()),
        };
        let schema = if config.name == builtin::AUDIT_QUERY_OPERATION && config.schema.fields.is_empty() {
            builtin::audit_query_schema()
        } else {
            Schema::from_config(&config.name, &config.schema)?
        };

        let mut op = Self::new(&config.name, roles, schema);
        if let Some(limit) = config.limit {
            let window = config
                .window_secs
                .map(Duration::from_secs)
                .unwrap_or(fallback_window);
            op = op.rate_limit(RateLimitPolicy::new(limit, window));
        }
        if let Some(ms) = config.timeout_ms {
            op = op.timeout(Duration::from_millis(ms));
        }
        if let Some(target_type) = &config.target_type {
            op.target_type = target_type.clone();
        }
        op.target_field = config.target_field.clone();
        op.actor_field = config.actor_field.clone();
        if let Some(raw) = &config.upstream {
            let url = Url::parse(raw).map_err(|e| {
                ConfigError::Validation(vec![ValidationError::new(
                    format!("{}.upstream", path),
                    e.to_string(),
                )])
            })?;
            op = op.upstream(url);
        }
        Ok(op)
    }
}

/// `topics.create` is audited against target type `topics`.
fn default_target_type(name: &str) -> String {
    name.split('.').next().unwrap_or(name).to_string()
}

/// Immutable set of protected operations, keyed by name.
#[derive(Debug)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<ProtectedOperation>>,
    fallback: RateLimitPolicy,
    default_timeout: Duration,
}

impl OperationRegistry {
    pub fn new(fallback: RateLimitPolicy, default_timeout: Duration) -> Self {
        Self {
            operations: HashMap::new(),
            fallback,
            default_timeout,
        }
    }

    /// Compile every `[[operations]]` entry. `audit.query` is added with its
    /// default declaration unless the config overrides it.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let fallback = RateLimitPolicy::new(
            config.rate_limit.default_limit,
            Duration::from_secs(config.rate_limit.default_window_secs),
        );
        let mut registry = Self::new(fallback, Duration::from_millis(config.timeouts.request_ms));

        for (i, op) in config.operations.iter().enumerate() {
            let path = format!("operations[{}]", i);
            registry.register(ProtectedOperation::from_config(op, &path, fallback.window)?);
        }
        if registry.get(builtin::AUDIT_QUERY_OPERATION).is_none() {
            registry.register(builtin::audit_query_operation());
        }

        tracing::info!(
            operations = registry.len(),
            fallback_limit = fallback.limit,
            fallback_window_secs = fallback.window.as_secs(),
            "Operation registry compiled"
        );
        Ok(registry)
    }

    /// Replaces any existing operation of the same name.
    pub fn register(&mut self, op: ProtectedOperation) {
        self.operations.insert(op.name.clone(), Arc::new(op));
    }

    pub fn with(mut self, op: ProtectedOperation) -> Self {
        self.register(op);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProtectedOperation>> {
        self.operations.get(name).cloned()
    }

    pub fn rate_limit_for(&self, op: &ProtectedOperation) -> RateLimitPolicy {
        op.rate_limit.unwrap_or(self.fallback)
    }

    pub fn timeout_for(&self, op: &ProtectedOperation) -> Duration {
        op.timeout.unwrap_or(self.default_timeout)
    }

    /// Sorted operation names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProtectedOperation>> {
        self.operations.values()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
