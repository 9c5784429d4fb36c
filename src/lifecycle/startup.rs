//! Startup orchestration.
//!
//! Order: audit sink (replayed, so a corrupt log stops startup), then the
//! gate, then background tasks. Listeners are bound last by the caller.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditLogger, AuditSink, JsonlFileSink, MemorySink, SinkError};
use crate::clock::Clock;
use crate::config::{AuditConfig, RateLimitConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::security::rate_limit::{RateLimitSweeper, RateLimiter};

/// Open the configured sink and continue its sequence numbering.
pub async fn open_audit_logger(
    config: &AuditConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<AuditLogger>, SinkError> {
    let write_timeout = Duration::from_millis(config.write_timeout_ms);
    let logger = match config.path.as_deref() {
        Some(path) => {
            let sink = JsonlFileSink::open(path).await?;
            let last = sink.last_sequence().unwrap_or(0);
            let sink: Arc<dyn AuditSink> = Arc::new(sink);
            AuditLogger::new(sink, clock, write_timeout).resume_after(last)
        }
        None => {
            tracing::warn!("audit.path not set, audit entries are kept in memory only");
            AuditLogger::new(Arc::new(MemorySink::new()), clock, write_timeout)
        }
    };
    Ok(Arc::new(logger))
}

/// Start the idle counter sweeper. It exits on shutdown.
pub fn spawn_sweeper(
    config: &RateLimitConfig,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    shutdown: &Shutdown,
) -> tokio::task::JoinHandle<()> {
    let sweeper = RateLimitSweeper::new(
        limiter,
        clock,
        Duration::from_secs(config.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run(shutdown.subscribe()))
}
