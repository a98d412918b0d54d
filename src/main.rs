//! Background worker entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGTERM / SIGINT ──▶ lifecycle::signals ──▶ Shutdown flag
//!                                                   │
//!                                                   ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ lifecycle::worker  (run loop)                             │
//!   │   process_batch → sleep active/idle                       │
//!   │   failure → backoff → … → max_retries → fatal stop        │
//!   └───────────────┬──────────────────────────────────────────┘
//!                   │ set_healthy / set_unhealthy
//!                   ▼
//!   health::state ◀── health::server  GET /health /healthz /ready
//! ```
//!
//! Exits non-zero when the worker stops because its retry ceiling was hit.

use std::path::PathBuf;
use std::process::ExitCode;

use async_trait::async_trait;
use clap::Parser;

use resilience_core::config::{load_config, AppConfig};
use resilience_core::health::{spawn_health_server, HealthHandle};
use resilience_core::lifecycle::{
    spawn_signal_listener, BatchError, BatchProcessor, RunMode, Shutdown, ShutdownCause, StopReason,
    WorkerLifecycle,
};
use resilience_core::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(about = "Run the background worker", long_about = None)]
struct Args {
    /// Run a single iteration and exit
    #[arg(long, env = "MYAPP_WORKER_ONCE")]
    once: bool,

    /// Port for the health probe server
    #[arg(long, env = "MYAPP_HEALTH_PORT")]
    health_port: Option<u16>,

    /// Numeric worker identifier
    #[arg(long, env = "MYAPP_WORKER_ID", default_value_t = 0)]
    worker_id: u32,

    /// Path to a TOML configuration file
    #[arg(long, env = "MYAPP_CONFIG")]
    config: Option<PathBuf>,
}

/// Placeholder batch source: finds no work on every poll.
struct ExampleProcessor;

#[async_trait]
impl BatchProcessor for ExampleProcessor {
    async fn process_batch(&mut self) -> Result<u64, BatchError> {
        tracing::debug!("Polling for work");
        Ok(0)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config: AppConfig = load_config(args.config.as_deref())?;
    if let Some(port) = args.health_port {
        config.worker.health_port = Some(port);
    }

    logging::init_logging(&config.observability);
    tracing::info!(
        worker = %config.worker.name,
        worker_id = args.worker_id,
        once = args.once,
        "worker v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    // The probe server outlives the worker's own shutdown flag so the final
    // status stays visible until the process exits.
    let server_shutdown = Shutdown::new();
    let health = HealthHandle::new();
    let server = match config.worker.health_port {
        Some(port) => {
            let (addr, task) = spawn_health_server(
                &config.health.bind_host,
                port,
                health.clone(),
                server_shutdown.clone(),
            )
            .await?;
            tracing::info!(address = %addr, "Health probe listening");
            Some(task)
        }
        None => None,
    };

    let mode = if args.once {
        RunMode::SingleShot
    } else {
        RunMode::Continuous
    };

    let mut worker = WorkerLifecycle::new(ExampleProcessor, &config.worker, &config.backoff)
        .with_worker_id(args.worker_id)
        .with_shutdown(shutdown.clone())
        .with_health(health);
    let report = worker.run(mode).await;

    shutdown.trigger(ShutdownCause::Requested);
    let _ = signals.await;
    server_shutdown.trigger(ShutdownCause::Requested);
    if let Some(task) = server {
        let _ = task.await;
    }

    tracing::info!(
        reason = ?report.reason,
        total_processed = report.total_processed,
        "Shutdown complete"
    );

    Ok(match report.reason {
        StopReason::RetriesExhausted => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
