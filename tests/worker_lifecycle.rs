//! Worker run loop behaviour.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use resilience_core::lifecycle::{
    BatchError, BatchProcessor, RunMode, ShutdownCause, StopReason, WorkerLifecycle, WorkerState,
};

mod common;

/// Counts calls and hook invocations; fails on every call when `fail` is set.
#[derive(Clone, Default)]
struct Probe {
    fail: bool,
    per_batch: u64,
    calls: Arc<AtomicU32>,
    errors_seen: Arc<AtomicU32>,
    startups: Arc<AtomicU32>,
    shutdowns: Arc<AtomicU32>,
    processed: Arc<AtomicU64>,
}

#[async_trait]
impl BatchProcessor for Probe {
    async fn process_batch(&mut self) -> Result<u64, BatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("downstream timeout".into());
        }
        self.processed.fetch_add(self.per_batch, Ordering::SeqCst);
        Ok(self.per_batch)
    }

    async fn on_startup(&mut self) {
        self.startups.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&mut self, _error: &BatchError, _error_count: u32) {
        self.errors_seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn single_shot_invokes_batch_once() {
    let (worker, backoff) = common::fast_worker_config(5);
    let probe = Probe {
        per_batch: 3,
        ..Probe::default()
    };
    let mut lifecycle = WorkerLifecycle::new(probe.clone(), &worker, &backoff);

    let report = lifecycle.run(RunMode::SingleShot).await;

    assert_eq!(report.reason, StopReason::SingleShot);
    assert_eq!(report.total_processed, 3);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    assert_eq!(probe.startups.load(Ordering::SeqCst), 1);
    assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn always_failing_batch_stops_after_max_retries() {
    let (worker, backoff) = common::fast_worker_config(4);
    let probe = Probe {
        fail: true,
        ..Probe::default()
    };
    let mut lifecycle = WorkerLifecycle::new(probe.clone(), &worker, &backoff);

    let report = tokio::time::timeout(Duration::from_secs(5), lifecycle.run(RunMode::Continuous))
        .await
        .expect("worker did not stop");

    assert_eq!(report.reason, StopReason::RetriesExhausted);
    assert_eq!(report.error_count, 4);
    assert_eq!(report.total_processed, 0);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    assert_eq!(probe.errors_seen.load(Ordering::SeqCst), 4);
    assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
    assert!(!lifecycle.is_running());
}

#[tokio::test]
async fn shutdown_flag_stops_continuous_worker() {
    let (mut worker, backoff) = common::fast_worker_config(5);
    worker.active_interval_secs = 0.01;
    let probe = Probe {
        per_batch: 1,
        ..Probe::default()
    };
    let mut lifecycle = WorkerLifecycle::new(probe.clone(), &worker, &backoff);
    let shutdown = lifecycle.shutdown_handle();

    let handle = tokio::spawn(async move {
        let report = lifecycle.run(RunMode::Continuous).await;
        (report, lifecycle)
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger(ShutdownCause::Signal);

    let (report, mut lifecycle) = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker ignored shutdown")
        .unwrap();

    assert_eq!(report.reason, StopReason::Signal);
    let calls = probe.calls.load(Ordering::SeqCst);
    assert!(calls >= 1);
    assert_eq!(report.total_processed, u64::from(calls));
    assert_eq!(probe.processed.load(Ordering::SeqCst), report.total_processed);

    // Stopping an already stopped worker is a no-op.
    lifecycle.stop();
    lifecycle.stop();
    assert_eq!(lifecycle.state(), WorkerState::Stopped);
    assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_interrupts_idle_sleep() {
    let (mut worker, backoff) = common::fast_worker_config(5);
    worker.idle_interval_secs = 30.0;
    let probe = Probe::default();
    let mut lifecycle = WorkerLifecycle::new(probe.clone(), &worker, &backoff);
    let shutdown = lifecycle.shutdown_handle();

    let handle = tokio::spawn(async move { lifecycle.run(RunMode::Continuous).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger(ShutdownCause::Requested);

    let report = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("idle sleep was not interrupted")
        .unwrap();
    assert_eq!(report.reason, StopReason::Stopped);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}
