//! Request payload validation.
//!
//! # Data Flow
//! ```text
//! [[operations]].schema (config) or builder calls
//!     → schema.rs (compile patterns, immutable Schema)
//! raw JSON payload
//!     → validator.rs (total check, narrow coercion, strict mode)
//!     → Sanitized | Vec<Violation>
//! ```
//!
//! # Design Decisions
//! - No early exit: callers get every violation in one round trip
//! - Undeclared fields are rejected unless the schema opts out
//! - Violations follow declaration order so results are deterministic

pub mod schema;
pub mod validator;

pub use schema::{FieldKind, FieldRule, Schema, SchemaError};
pub use validator::{validate, Sanitized, Violation, ViolationRule};
