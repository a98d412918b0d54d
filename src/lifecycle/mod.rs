//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger(Signal)
//!
//! Shutdown (shutdown.rs):
//!     First trigger wins → flag set → watchers woken
//!
//! Worker (worker.rs):
//!     on_startup → [check flag → process_batch → sleep]* → on_shutdown
//!     consecutive failures ≥ max_retries → fatal stop
//! ```
//!
//! # Design Decisions
//! - The signal path only sets a flag; the loop observes it between batches
//! - An in-flight batch is never cancelled
//! - Error escalation reuses the backoff policy instead of a private formula

pub mod shutdown;
pub mod signals;
pub mod worker;

pub use shutdown::{Shutdown, ShutdownCause};
pub use signals::spawn_signal_listener;
pub use worker::{BatchError, BatchProcessor, RunMode, StopReason, WorkerLifecycle, WorkerReport, WorkerState};
