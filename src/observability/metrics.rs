//! Metrics collection and exposition.
//!
//! # Metrics
//! - `worker_batches_total` (counter): batches run, by worker and outcome
//! - `worker_items_processed_total` (counter): items reported by batches
//! - `worker_batch_errors_total` (counter): failed batches
//! - `worker_running` (gauge): 1 while the run loop is active
//! - `rate_limit_decisions_total` (counter): admissions by outcome
//! - `rate_limit_store_fallbacks_total` (counter): shared store failures
//! - `circuit_breaker_transitions_total` (counter): state changes by target
//! - `retry_attempts_total` (counter): retries by operation
//!
//! Updates go through the `metrics` facade and are no-ops until a recorder
//! is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_batch(worker: &str, processed: u64) {
    metrics::counter!("worker_batches_total", "worker" => worker.to_string(), "outcome" => "ok")
        .increment(1);
    metrics::counter!("worker_items_processed_total", "worker" => worker.to_string())
        .increment(processed);
}

pub fn record_batch_error(worker: &str) {
    metrics::counter!("worker_batches_total", "worker" => worker.to_string(), "outcome" => "error")
        .increment(1);
    metrics::counter!("worker_batch_errors_total", "worker" => worker.to_string()).increment(1);
}

pub fn record_worker_running(worker: &str, running: bool) {
    metrics::gauge!("worker_running", "worker" => worker.to_string())
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_rate_limit(limited: bool) {
    let outcome = if limited { "limited" } else { "allowed" };
    metrics::counter!("rate_limit_decisions_total", "outcome" => outcome).increment(1);
}

pub fn record_store_fallback() {
    metrics::counter!("rate_limit_store_fallbacks_total").increment(1);
}

pub fn record_circuit_transition(breaker: &str, to: &'static str) {
    metrics::counter!(
        "circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_retry(operation: &str) {
    metrics::counter!("retry_attempts_total", "operation" => operation.to_string()).increment(1);
}
