//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! GateTicket (subject) + operation name
//!     → rate_limit.rs (fixed-window quota per key)
//!     → Allow { remaining } | Reject { retry_after }
//! ```
//!
//! # Design Decisions
//! - Limits are per operation; operations without one get a conservative default
//! - Counter updates are linearizable per key, no cross-key coordination
//! - Idle counters are swept in the background to bound memory

pub mod rate_limit;

pub use rate_limit::{RateDecision, RateLimitKey, RateLimitPolicy, RateLimitSweeper, RateLimiter};
