//! Health probe subsystem.
//!
//! # Data Flow
//! ```text
//! Worker (lifecycle/worker.rs):
//!     startup → HealthHandle::set_healthy({worker, worker_id})
//!     fatal stop → HealthHandle::set_unhealthy(reason)
//!
//! Probe server (server.rs):
//!     GET /health | /healthz | /ready → snapshot → 200 or 503
//! ```
//!
//! # Design Decisions
//! - One shared record per process, passed explicitly as a handle
//! - The server runs on its own task and never blocks the run loop

pub mod server;
pub mod state;

pub use server::{health_router, spawn_health_server, HealthServer};
pub use state::{HealthHandle, HealthStatus};
