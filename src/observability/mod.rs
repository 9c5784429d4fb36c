//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate stages, audit logger, sweeper produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request ID is a field on every pipeline event
//! - Bearer tokens never reach a log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
