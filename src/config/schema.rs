//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Role;
use crate::validation::FieldKind;

/// Root configuration for the admin gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Credential store and lookup settings.
    pub identity: IdentityConfig,

    /// Rate limiting defaults and counter eviction.
    pub rate_limit: RateLimitConfig,

    /// Audit sink settings.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Protected operations.
    pub operations: Vec<OperationConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default time budget for an operation's action, in milliseconds.
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Upper bound on a credential store lookup.
    pub lookup_timeout_ms: u64,

    pub sessions: Vec<SessionConfig>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 500,
            sessions: Vec::new(),
        }
    }
}

/// One bearer token and the identity it resolves to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub token: String,
    pub subject: String,
    pub role: Role,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fallback quota for operations without their own limit.
    pub default_limit: u32,

    /// Fallback window length in seconds.
    pub default_window_secs: u64,

    /// Windows a counter may sit idle before it is purged.
    pub idle_windows: u32,

    /// How often the sweeper runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_window_secs: 60,
            idle_windows: 2,
            sweep_interval_secs: 60,
        }
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines log file. In-memory sink when unset.
    pub path: Option<String>,

    /// Upper bound on a single durable append.
    pub write_timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            write_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A protected operation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationConfig {
    /// Operation name, used in `/ops/{name}` and as the audit action.
    pub name: String,

    /// Explicit allowed roles.
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Shorthand for this role and every role above it.
    #[serde(default)]
    pub min_role: Option<Role>,

    /// Requests per window. Falls back to `rate_limit.default_limit`.
    #[serde(default)]
    pub limit: Option<u32>,

    #[serde(default)]
    pub window_secs: Option<u64>,

    /// Falls back to `timeouts.request_ms`.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Where allowed payloads are forwarded.
    #[serde(default)]
    pub upstream: Option<String>,

    /// Audit target type. Defaults to the operation name's first segment.
    #[serde(default)]
    pub target_type: Option<String>,

    /// Sanitized payload field copied into the audit target id.
    #[serde(default)]
    pub target_field: Option<String>,

    /// Payload field the acting subject is written into before forwarding.
    #[serde(default)]
    pub actor_field: Option<String>,

    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Payload schema of an operation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Defaults to the operation name.
    pub name: Option<String>,
    pub version: u32,
    /// Reject undeclared fields.
    pub strict: bool,
    pub fields: Vec<FieldConfig>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            name: None,
            version: 1,
            strict: true,
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub min_length: Option<usize>,

    #[serde(default)]
    pub max_length: Option<usize>,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    /// Reject numbers with a fractional part.
    #[serde(default)]
    pub integral: bool,

    #[serde(default)]
    pub one_of: Option<Vec<String>>,

    #[serde(default)]
    pub pattern: Option<String>,

    /// Nested fields when `type = "object"`.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}
