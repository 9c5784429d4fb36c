//! Declarative payload schemas.
//!
//! Schemas are built once at startup, either in code with the builder methods
//! or compiled from `[[operations]]` configuration, and are immutable after.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{FieldConfig, SchemaConfig};

/// Accepted value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    /// A number, or a string holding one. The only kind that coerces.
    Numeric,
    Boolean,
    Uuid,
    Email,
    /// RFC 3339 timestamp, normalized to UTC.
    Timestamp,
    Object,
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Integer => "an integer",
            FieldKind::Number => "a number",
            FieldKind::Numeric => "a number or numeric string",
            FieldKind::Boolean => "a boolean",
            FieldKind::Uuid => "a UUID",
            FieldKind::Email => "an email address",
            FieldKind::Timestamp => "an RFC 3339 timestamp",
            FieldKind::Object => "an object",
        }
    }
}

/// Rules for one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Numbers must be whole.
    pub integral: bool,
    pub one_of: Option<Vec<String>>,
    pub pattern: Option<Regex>,
    /// Nested fields of an `Object`.
    pub fields: Vec<FieldRule>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            integral: false,
            one_of: None,
            pattern: None,
            fields: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Numeric)
    }

    pub fn object(name: impl Into<String>, fields: Vec<FieldRule>) -> Self {
        let mut rule = Self::new(name, FieldKind::Object);
        rule.fields = fields;
        rule
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        self.min = Some(n);
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        self.max = Some(n);
        self
    }

    pub fn integral(mut self) -> Self {
        self.integral = true;
        self
    }

    pub fn one_of<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Anchored: the pattern must match the whole value.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, SchemaError> {
        self.pattern = Some(compile_pattern(&self.name, pattern)?);
        Ok(self)
    }

    fn from_config(config: &FieldConfig) -> Result<Self, SchemaError> {
        let pattern = config
            .pattern
            .as_deref()
            .map(|p| compile_pattern(&config.name, p))
            .transpose()?;
        let fields = config
            .fields
            .iter()
            .map(FieldRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            required: config.required,
            min_length: config.min_length,
            max_length: config.max_length,
            min: config.min,
            max: config.max,
            integral: config.integral,
            one_of: config.one_of.clone(),
            pattern,
            fields,
        })
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field '{field}': invalid pattern: {source}")]
    Pattern {
        field: String,
        #[source]
        source: regex::Error,
    },
}

fn compile_pattern(field: &str, pattern: &str) -> Result<Regex, SchemaError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| SchemaError::Pattern {
        field: field.to_string(),
        source,
    })
}

/// A named, versioned, ordered set of field rules.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub version: u32,
    /// Reject undeclared fields instead of dropping them.
    pub strict: bool,
    pub fields: Vec<FieldRule>,
}

impl Schema {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            strict: true,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn permissive(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn from_config(default_name: &str, config: &SchemaConfig) -> Result<Self, SchemaError> {
        let fields = config
            .fields
            .iter()
            .map(FieldRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: config.name.clone().unwrap_or_else(|| default_name.to_string()),
            version: config.version,
            strict: config.strict,
            fields,
        })
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.name == field)
    }
}
