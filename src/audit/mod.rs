//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! gate composer
//!     → AuditDraft (request id, actor, action, target, outcome, reason)
//!     → logger.rs (stamp id + sequence + timestamp, bounded write)
//!     → sink.rs / file.rs (durable append)
//!
//! GET /audit, gate-cli audit
//!     → AuditQuery → sink.query → entries ordered by (timestamp, sequence)
//! ```
//!
//! # Design Decisions
//! - Entries are append-only and never rewritten
//! - Denial write failures alert; execution write failures are audit gaps

pub mod entry;
pub mod file;
pub mod logger;
pub mod sink;

pub use entry::{Actor, AuditDraft, AuditEntry, AuditOutcome, AuditQuery};
pub use file::JsonlFileSink;
pub use logger::{AuditAck, AuditFailure, AuditLogger};
pub use sink::{AuditSink, MemorySink, SinkError};
