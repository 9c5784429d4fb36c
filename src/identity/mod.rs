//! Identity subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization header / identity claim
//!     → credentials.rs (Credentials, CredentialStore lookup)
//!     → gate.rs (session window, claim check, role set membership)
//!     → GateTicket handed to the rest of the pipeline
//! ```
//!
//! # Design Decisions
//! - Fail closed: store errors and lookup timeouts deny
//! - Role checks are set membership; hierarchies are flattened in role.rs
//! - Tokens never appear in logs or Debug output

pub mod credentials;
pub mod gate;
pub mod role;

pub use credentials::{CredentialError, CredentialStore, Credentials, Identity, SessionWindow, StaticCredentialStore};
pub use gate::{GateTicket, IdentityFailure, IdentityGate, IdentityRejection};
pub use role::{Role, RoleSet};
