//! Fixed-window rate limiting per (subject, operation).
//!
//! A request at time `t` belongs to window `floor(t / window)`. The first
//! request that lands in a later window resets the counter and is counted in
//! the same critical section, so concurrent requests at a boundary produce
//! exactly one reset.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::observability::metrics;

/// Counter table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub subject: String,
    pub resource: String,
}

impl RateLimitKey {
    pub fn new(subject: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
        }
    }
}

/// `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    fn window_ms(&self) -> u64 {
        (self.window.as_millis() as u64).max(1)
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow { remaining: u32 },
    Reject { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow { .. })
    }
}

#[derive(Debug)]
struct WindowCounter {
    window_index: u64,
    window_ms: u64,
    count: u32,
}

/// The shared counter table.
pub struct RateLimiter {
    counters: DashMap<RateLimitKey, WindowCounter>,
    idle_windows: u64,
}

impl RateLimiter {
    /// Counters idle for more than `idle_windows` full windows are purgeable.
    pub fn new(idle_windows: u32) -> Self {
        Self {
            counters: DashMap::new(),
            idle_windows: u64::from(idle_windows.max(1)),
        }
    }

    pub fn check(&self, key: &RateLimitKey, policy: RateLimitPolicy, now: Duration) -> RateDecision {
        let window_ms = policy.window_ms();
        let now_ms = now.as_millis() as u64;
        let index = now_ms / window_ms;

        // The entry guard holds the shard lock: reset, increment and the
        // limit comparison happen as one step for this key.
        let mut counter = self
            .counters
            .entry(key.clone())
            .or_insert_with(|| WindowCounter {
                window_index: index,
                window_ms,
                count: 0,
            });

        if index > counter.window_index || counter.window_ms != window_ms {
            counter.window_index = index;
            counter.window_ms = window_ms;
            counter.count = 0;
        }

        if counter.count < policy.limit {
            counter.count += 1;
            RateDecision::Allow {
                remaining: policy.limit - counter.count,
            }
        } else {
            let window_end = (counter.window_index + 1).saturating_mul(window_ms);
            RateDecision::Reject {
                retry_after: Duration::from_millis(window_end.saturating_sub(now_ms)),
            }
        }
    }

    /// Drop counters whose window ended more than `idle_windows` windows ago.
    /// A counter for the window `now` falls in is never removed.
    pub fn purge_idle(&self, now: Duration) -> usize {
        let now_ms = now.as_millis() as u64;
        let mut purged = 0;
        self.counters.retain(|_, counter| {
            let current = now_ms / counter.window_ms;
            let keep = current <= counter.window_index.saturating_add(self.idle_windows);
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Background task that periodically purges idle counters.
pub struct RateLimitSweeper {
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl RateLimitSweeper {
    pub fn new(limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            limiter,
            clock,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Rate limit sweeper starting");

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.limiter.purge_idle(self.clock.now());
                    let remaining = self.limiter.len();
                    if purged > 0 {
                        tracing::debug!(purged, remaining, "Purged idle rate limit counters");
                    }
                    metrics::record_counter_table_size(remaining);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
