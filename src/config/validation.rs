//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Every problem is collected so
//! an operator fixes the file in one pass.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{FieldConfig, GateConfig, OperationConfig};
use crate::validation::FieldKind;

/// A single semantic problem, located by a dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Operation that serves the audit read side. It needs no upstream.
pub const BUILTIN_OPERATIONS: &[&str] = &["audit.query"];

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than 0"));
    }
    if config.identity.lookup_timeout_ms == 0 {
        errors.push(ValidationError::new("identity.lookup_timeout_ms", "must be greater than 0"));
    }
    if config.rate_limit.default_limit == 0 {
        errors.push(ValidationError::new("rate_limit.default_limit", "must be greater than 0"));
    }
    if config.rate_limit.default_window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.default_window_secs", "must be greater than 0"));
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than 0"));
    }
    if config.audit.write_timeout_ms == 0 {
        errors.push(ValidationError::new("audit.write_timeout_ms", "must be greater than 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut tokens = HashSet::new();
    for (i, session) in config.identity.sessions.iter().enumerate() {
        let path = format!("identity.sessions[{}]", i);
        if session.token.is_empty() {
            errors.push(ValidationError::new(format!("{}.token", path), "must not be empty"));
        } else if !tokens.insert(session.token.as_str()) {
            // Never echo the token itself.
            errors.push(ValidationError::new(format!("{}.token", path), "duplicate token"));
        }
        if session.subject.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.subject", path), "must not be empty"));
        }
        if let (Some(from), Some(until)) = (session.valid_from, session.valid_until) {
            if from >= until {
                errors.push(ValidationError::new(path, "valid_from must be before valid_until"));
            }
        }
    }

    let mut names = HashSet::new();
    for (i, op) in config.operations.iter().enumerate() {
        let path = format!("operations[{}]", i);
        if op.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", path), "must not be empty"));
        } else if !names.insert(op.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", path),
                format!("duplicate operation '{}'", op.name),
            ));
        }
        validate_operation(&path, op, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_operation(path: &str, op: &OperationConfig, errors: &mut Vec<ValidationError>) {
    if op.roles.is_empty() && op.min_role.is_none() {
        errors.push(ValidationError::new(path, "one of 'roles' or 'min_role' is required"));
    }
    if !op.roles.is_empty() && op.min_role.is_some() {
        errors.push(ValidationError::new(path, "'roles' and 'min_role' are mutually exclusive"));
    }
    if op.limit == Some(0) {
        errors.push(ValidationError::new(format!("{}.limit", path), "must be greater than 0"));
    }
    if op.window_secs == Some(0) {
        errors.push(ValidationError::new(format!("{}.window_secs", path), "must be greater than 0"));
    }
    if op.timeout_ms == Some(0) {
        errors.push(ValidationError::new(format!("{}.timeout_ms", path), "must be greater than 0"));
    }

    match op.upstream.as_deref() {
        Some(raw) => match url::Url::parse(raw) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => errors.push(ValidationError::new(
                format!("{}.upstream", path),
                format!("unsupported scheme '{}'", u.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(format!("{}.upstream", path), e.to_string())),
        },
        None if !BUILTIN_OPERATIONS.contains(&op.name.as_str()) => {
            errors.push(ValidationError::new(
                format!("{}.upstream", path),
                "required for operations without a built-in action",
            ));
        }
        None => {}
    }

    validate_fields(&format!("{}.schema", path), &op.schema.fields, errors);

    let declared = |name: &str| op.schema.fields.iter().any(|f| f.name == name);
    if let Some(target) = op.target_field.as_deref() {
        if !declared(target) {
            errors.push(ValidationError::new(
                format!("{}.target_field", path),
                format!("'{}' is not a declared schema field", target),
            ));
        }
    }
    if let Some(actor) = op.actor_field.as_deref() {
        if declared(actor) {
            errors.push(ValidationError::new(
                format!("{}.actor_field", path),
                format!("'{}' is set by the gate and must not be declared in the schema", actor),
            ));
        }
    }
}

fn validate_fields(path: &str, fields: &[FieldConfig], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for field in fields {
        let field_path = format!("{}.{}", path, field.name);
        if field.name.is_empty() {
            errors.push(ValidationError::new(path, "field name must not be empty"));
            continue;
        }
        if !seen.insert(field.name.as_str()) {
            errors.push(ValidationError::new(&field_path, "duplicate field"));
        }
        if let (Some(lo), Some(hi)) = (field.min_length, field.max_length) {
            if lo > hi {
                errors.push(ValidationError::new(&field_path, "min_length exceeds max_length"));
            }
        }
        if let (Some(lo), Some(hi)) = (field.min, field.max) {
            if lo > hi {
                errors.push(ValidationError::new(&field_path, "min exceeds max"));
            }
        }
        if field.integral && !matches!(field.kind, FieldKind::Integer | FieldKind::Number | FieldKind::Numeric) {
            errors.push(ValidationError::new(&field_path, "integral applies to number fields only"));
        }
        if field.one_of.as_ref().is_some_and(|v| v.is_empty()) {
            errors.push(ValidationError::new(&field_path, "one_of must not be empty"));
        }
        if let Some(pattern) = field.pattern.as_deref() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError::new(&field_path, format!("invalid pattern: {}", e)));
            }
        }
        if !field.fields.is_empty() {
            validate_fields(&field_path, &field.fields, errors);
        }
    }
}
