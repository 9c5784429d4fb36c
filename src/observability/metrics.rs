//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_decisions_total` (counter): terminal outcomes by operation, outcome
//! - `gate_rate_limited_total` (counter): quota rejections by operation
//! - `gate_validation_failures_total` (counter): rejected payloads by operation
//! - `gate_audit_write_failures_total` (counter): failed appends by kind
//! - `gate_audit_gaps_total` (counter): executed actions without an outcome entry
//! - `gate_rate_limit_counters` (gauge): live counter table size
//! - `gate_request_duration_seconds` (histogram): pipeline latency by operation
//!
//! Every function is a no-op until a recorder is installed, so tests and
//! library users pay nothing.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_decision(operation: &str, outcome: &'static str, start: Instant) {
    counter!(
        "gate_decisions_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gate_request_duration_seconds", "operation" => operation.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(operation: &str) {
    counter!("gate_rate_limited_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_validation_failure(operation: &str) {
    counter!("gate_validation_failures_total", "operation" => operation.to_string()).increment(1);
}

/// `kind` is `decision` or `outcome`.
pub fn record_audit_write_failure(kind: &'static str) {
    counter!("gate_audit_write_failures_total", "kind" => kind).increment(1);
}

pub fn record_audit_gap(operation: &str) {
    counter!("gate_audit_gaps_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_counter_table_size(size: usize) {
    gauge!("gate_rate_limit_counters").set(size as f64);
}
