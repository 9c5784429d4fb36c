//! Gate composer subsystem.
//!
//! # Data Flow
//! ```text
//! GateRequest { request_id, operation, credentials, payload, correlation_id }
//!     → operation.rs (look up ProtectedOperation; unknown = forbidden)
//!     → composer.rs  (identity → rate limit → validation → action)
//!     → audit        (one decision entry, one outcome entry if executed)
//!     → response.rs  (GateOutcome / GateResponse)
//! ```
//!
//! # Design Decisions
//! - One `Gate` serves every operation; operations differ only by declaration
//! - Stage order is fixed and shared
//! - Every path ends in a `GateResponse`, never a panic or raw error

pub mod action;
pub mod builtin;
pub mod composer;
pub mod operation;
pub mod response;

pub use action::{Action, ActionError, ActionRegistry};
pub use builtin::{register_builtin_actions, AuditQueryAction, AUDIT_QUERY_OPERATION};
pub use composer::{Gate, GateRequest, Stage, STAGE_ORDER};
pub use operation::{OperationRegistry, ProtectedOperation};
pub use response::{Denial, GateOutcome, GateResponse};
