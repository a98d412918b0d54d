//! Background worker run loop.
//!
//! # States
//! ```text
//! Created ──run()──▶ Running ──flag / retries exhausted / single shot──▶ Stopping
//!                                                                          │
//!                                              on_shutdown complete ──▶ Stopped
//! ```
//!
//! Each iteration calls [`BatchProcessor::process_batch`] once. Success
//! resets the consecutive error count and sleeps the active interval (work
//! found) or the idle interval (none). Failure sleeps an escalating delay,
//! and `max_retries` consecutive failures stop the worker for good.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map};
use tracing::{debug, error, info, warn};

use crate::config::{BackoffConfig, WorkerConfig};
use crate::health::HealthHandle;
use crate::lifecycle::{Shutdown, ShutdownCause};
use crate::observability::metrics;
use crate::resilience::backoff::{BackoffPolicy, WORKER_EXPONENT_CAP};

/// Error returned by a failed batch.
pub type BatchError = Box<dyn std::error::Error + Send + Sync>;

/// The unit of work a worker repeats.
#[async_trait]
pub trait BatchProcessor: Send {
    /// Process one batch and return how many items were handled.
    async fn process_batch(&mut self) -> Result<u64, BatchError>;

    async fn on_startup(&mut self) {}

    async fn on_shutdown(&mut self) {}

    /// Called after every failed batch.
    fn on_error(&mut self, error: &BatchError, error_count: u32) {
        error!(error = %error, error_count, "Batch failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    /// Run exactly one iteration, whatever its outcome.
    SingleShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    Stopped,
    RetriesExhausted,
    SingleShot,
}

impl From<ShutdownCause> for StopReason {
    fn from(cause: ShutdownCause) -> Self {
        match cause {
            ShutdownCause::Signal => StopReason::Signal,
            ShutdownCause::Requested => StopReason::Stopped,
        }
    }
}

/// Summary returned when the run loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub total_processed: u64,
    pub error_count: u32,
    pub reason: StopReason,
}

pub struct WorkerLifecycle<P> {
    name: String,
    worker_id: u32,
    processor: P,
    idle_interval: Duration,
    active_interval: Duration,
    max_retries: u32,
    backoff: BackoffPolicy,
    shutdown: Shutdown,
    health: Option<HealthHandle>,
    state: WorkerState,
    error_count: u32,
    total_processed: u64,
}

impl<P: BatchProcessor> WorkerLifecycle<P> {
    pub fn new(processor: P, config: &WorkerConfig, backoff: &BackoffConfig) -> Self {
        Self {
            name: config.name.clone(),
            worker_id: 0,
            processor,
            idle_interval: config.idle_interval(),
            active_interval: config.active_interval(),
            max_retries: config.max_retries,
            backoff: BackoffPolicy::worker(backoff),
            shutdown: Shutdown::new(),
            health: None,
            state: WorkerState::Created,
            error_count: 0,
            total_processed: 0,
        }
    }

    pub fn with_worker_id(mut self, worker_id: u32) -> Self {
        self.worker_id = worker_id;
        self
    }

    /// Use an externally owned shutdown flag (e.g. one fed by signals).
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_health(mut self, health: HealthHandle) -> Self {
        self.health = Some(health);
        self
    }

    /// Handle that stops the loop from another task.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Stop a worker that is not running. Before `run` the worker is marked
    /// stopped; afterwards this is a no-op.
    ///
    /// `run` holds the worker exclusively, so a running loop is stopped
    /// through [`shutdown_handle`](Self::shutdown_handle) instead.
    pub fn stop(&mut self) {
        if self.state == WorkerState::Created {
            self.shutdown.trigger(ShutdownCause::Requested);
            self.state = WorkerState::Stopped;
        }
    }

    /// Error delay after `error_count` consecutive failures.
    fn error_delay(&self) -> Duration {
        self.backoff.delay(self.error_count.min(WORKER_EXPONENT_CAP))
    }

    fn report(&self, reason: StopReason) -> WorkerReport {
        WorkerReport {
            total_processed: self.total_processed,
            error_count: self.error_count,
            reason,
        }
    }

    /// Sleep unless the shutdown flag is set first.
    async fn pause(shutdown: &Shutdown, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.wait() => {}
        }
    }

    /// Drive the loop until it stops.
    pub async fn run(&mut self, mode: RunMode) -> WorkerReport {
        if self.state != WorkerState::Created {
            warn!(worker = %self.name, state = ?self.state, "Worker already ran");
            return self.report(StopReason::Stopped);
        }

        self.state = WorkerState::Running;
        metrics::record_worker_running(&self.name, true);
        info!(
            worker = %self.name,
            worker_id = self.worker_id,
            mode = ?mode,
            idle_interval_ms = self.idle_interval.as_millis() as u64,
            active_interval_ms = self.active_interval.as_millis() as u64,
            max_retries = self.max_retries,
            "Worker starting"
        );

        if let Some(health) = &self.health {
            let mut details = Map::new();
            details.insert("worker".to_string(), json!(self.name));
            details.insert("worker_id".to_string(), json!(self.worker_id));
            health.set_healthy(details);
        }

        self.processor.on_startup().await;

        let reason = loop {
            if let Some(cause) = self.shutdown.cause() {
                break StopReason::from(cause);
            }

            match self.processor.process_batch().await {
                Ok(processed) => {
                    self.total_processed += processed;
                    self.error_count = 0;
                    metrics::record_batch(&self.name, processed);
                    debug!(worker = %self.name, processed, total = self.total_processed, "Batch complete");

                    if mode == RunMode::SingleShot {
                        break StopReason::SingleShot;
                    }

                    let interval = if processed > 0 {
                        self.active_interval
                    } else {
                        self.idle_interval
                    };
                    Self::pause(&self.shutdown, interval).await;
                }
                Err(e) => {
                    self.error_count += 1;
                    self.processor.on_error(&e, self.error_count);
                    metrics::record_batch_error(&self.name);

                    if self.error_count >= self.max_retries {
                        error!(
                            worker = %self.name,
                            error_count = self.error_count,
                            max_retries = self.max_retries,
                            "Max retries exceeded, stopping worker"
                        );
                        if let Some(health) = &self.health {
                            health.set_unhealthy("Max retries exceeded");
                        }
                        break StopReason::RetriesExhausted;
                    }

                    if mode == RunMode::SingleShot {
                        break StopReason::SingleShot;
                    }

                    let delay = self.error_delay();
                    warn!(
                        worker = %self.name,
                        error_count = self.error_count,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off after batch failure"
                    );
                    Self::pause(&self.shutdown, delay).await;
                }
            }
        };

        self.state = WorkerState::Stopping;
        self.processor.on_shutdown().await;
        self.state = WorkerState::Stopped;
        metrics::record_worker_running(&self.name, false);

        info!(
            worker = %self.name,
            reason = ?reason,
            total_processed = self.total_processed,
            error_count = self.error_count,
            "Worker stopped"
        );
        self.report(reason)
    }
}
