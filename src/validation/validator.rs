//! Payload validation against a [`Schema`].
//!
//! Validation is total: every declared field is checked and every violation
//! is reported, in schema declaration order, followed by undeclared fields.

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::fmt;

use crate::validation::schema::{FieldKind, FieldRule, Schema};

/// Which rule a field broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationRule {
    /// Required and absent, null, or blank.
    Missing,
    /// Present with the wrong type.
    Type,
    /// Present and well-typed but outside a declared constraint.
    Constraint(&'static str),
    /// Not declared by a strict schema.
    Unknown,
}

impl fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationRule::Missing => f.write_str("missing"),
            ViolationRule::Type => f.write_str("type"),
            ViolationRule::Constraint(name) => write!(f, "constraint:{}", name),
            ViolationRule::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for ViolationRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One field-level error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Dotted path; `$` is the payload itself.
    pub field: String,
    pub rule: ViolationRule,
    pub message: String,
}

impl Violation {
    fn new(field: &str, rule: ViolationRule, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            rule,
            message: message.into(),
        }
    }
}

/// A payload that passed validation: declared fields only, strings trimmed,
/// `numeric` values coerced, optional absent fields omitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sanitized(Map<String, Value>);

impl Sanitized {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Validate `payload` against `schema`.
pub fn validate(schema: &Schema, payload: &Value) -> Result<Sanitized, Vec<Violation>> {
    let Value::Object(map) = payload else {
        return Err(vec![Violation::new(
            "$",
            ViolationRule::Type,
            "payload must be a JSON object",
        )]);
    };

    let mut violations = Vec::new();
    let sanitized = check_object(&schema.fields, schema.strict, map, None, &mut violations);

    if violations.is_empty() {
        Ok(Sanitized(sanitized))
    } else {
        Err(violations)
    }
}

fn path_of(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{}.{}", p, name),
        None => name.to_string(),
    }
}

fn check_object(
    fields: &[FieldRule],
    strict: bool,
    map: &Map<String, Value>,
    prefix: Option<&str>,
    violations: &mut Vec<Violation>,
) -> Map<String, Value> {
    let mut out = Map::new();

    for rule in fields {
        let path = path_of(prefix, &rule.name);
        if let Some(value) = check_field(rule, strict, map.get(&rule.name), &path, violations) {
            out.insert(rule.name.clone(), value);
        }
    }

    if strict {
        let mut unknown: Vec<&String> = map
            .keys()
            .filter(|k| !fields.iter().any(|f| &f.name == *k))
            .collect();
        unknown.sort();
        for key in unknown {
            violations.push(Violation::new(
                &path_of(prefix, key),
                ViolationRule::Unknown,
                "field is not declared by the schema",
            ));
        }
    }

    out
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Returns the sanitized value, `None` when the field is omitted or invalid.
/// Pushes at most one violation for scalar fields.
fn check_field(
    rule: &FieldRule,
    strict: bool,
    value: Option<&Value>,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Option<Value> {
    let value = match value {
        Some(v) if !is_blank(v) => v,
        _ => {
            if rule.required {
                violations.push(Violation::new(path, ViolationRule::Missing, "field is required"));
            }
            return None;
        }
    };

    if rule.kind == FieldKind::Object {
        let Value::Object(nested) = value else {
            violations.push(type_violation(path, rule.kind));
            return None;
        };
        let before = violations.len();
        let out = check_object(&rule.fields, strict, nested, Some(path), violations);
        return (violations.len() == before).then_some(Value::Object(out));
    }

    let coerced = match coerce(rule.kind, value) {
        Some(v) => v,
        None => {
            violations.push(type_violation(path, rule.kind));
            return None;
        }
    };

    match first_broken_constraint(rule, &coerced) {
        Some((name, message)) => {
            violations.push(Violation::new(path, ViolationRule::Constraint(name), message));
            None
        }
        None => Some(coerced),
    }
}

fn type_violation(path: &str, kind: FieldKind) -> Violation {
    Violation::new(path, ViolationRule::Type, format!("expected {}", kind.describe()))
}

/// Narrow, explicit coercion. `None` means a type violation.
fn coerce(kind: FieldKind, value: &Value) -> Option<Value> {
    match kind {
        FieldKind::String => value.as_str().map(|s| Value::String(s.trim().to_string())),
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            _ => None,
        },
        FieldKind::Number => match value {
            Value::Number(_) => Some(value.clone()),
            _ => None,
        },
        FieldKind::Numeric => match value {
            Value::Number(n) if n.is_f64() => n.as_f64().and_then(number_value),
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(number_value),
            _ => None,
        },
        FieldKind::Boolean => value.as_bool().map(Value::Bool),
        FieldKind::Uuid => value
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s.trim()).ok())
            .map(|u| Value::String(u.hyphenated().to_string())),
        FieldKind::Email => value
            .as_str()
            .map(str::trim)
            .filter(|s| looks_like_email(s))
            .map(|s| Value::String(s.to_string())),
        FieldKind::Timestamp => value
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| Value::String(dt.with_timezone(&chrono::Utc).to_rfc3339())),
        FieldKind::Object => None,
    }
}

/// Integral values become JSON integers so they deserialize into integer types.
fn number_value(f: f64) -> Option<Value> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Some(Value::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number)
    }
}

fn looks_like_email(s: &str) -> bool {
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

fn first_broken_constraint(rule: &FieldRule, value: &Value) -> Option<(&'static str, String)> {
    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.min_length {
            if len < min {
                return Some(("min_length", format!("must be at least {} characters", min)));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max {
                return Some(("max_length", format!("must be at most {} characters", max)));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rule.min {
            if n < min {
                return Some(("min", format!("must be at least {}", min)));
            }
        }
        if let Some(max) = rule.max {
            if n > max {
                return Some(("max", format!("must be at most {}", max)));
            }
        }
        if rule.integral && n.fract() != 0.0 {
            return Some(("integral", "must be a whole number".to_string()));
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(allowed) = &rule.one_of {
            if !allowed.iter().any(|a| a == s) {
                return Some(("one_of", format!("must be one of: {}", allowed.join(", "))));
            }
        }
        if let Some(pattern) = &rule.pattern {
            if !pattern.is_match(s) {
                return Some(("pattern", "does not match the required format".to_string()));
            }
        }
    }

    None
}
