//! Health probe HTTP server.
//!
//! `GET /health`, `/healthz` and `/ready` return the health record as JSON
//! with 200 when healthy and 503 otherwise. Any other path is a 404 with an
//! empty body.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::health::HealthHandle;
use crate::lifecycle::Shutdown;

pub fn health_router(handle: HealthHandle) -> Router {
    Router::new()
        .route("/health", get(probe_handler))
        .route("/healthz", get(probe_handler))
        .route("/ready", get(probe_handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(handle)
        .layer(TraceLayer::new_for_http())
}

async fn probe_handler(State(handle): State<HealthHandle>) -> Response {
    let status = handle.snapshot();
    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

/// Probe server bound to a listener.
pub struct HealthServer {
    listener: TcpListener,
    handle: HealthHandle,
}

impl HealthServer {
    /// Bind to `host:port`. Port 0 picks a free port.
    pub async fn bind(host: &str, port: u16, handle: HealthHandle) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        Ok(Self { listener, handle })
    }

    pub fn from_listener(listener: TcpListener, handle: HealthHandle) -> Self {
        Self { listener, handle }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is triggered.
    pub async fn run(self, shutdown: Shutdown) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        tracing::info!(address = %addr, "Health server starting");

        axum::serve(self.listener, health_router(self.handle))
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Bind and run the probe server on its own task.
///
/// Returns the bound address so callers using port 0 can find it.
pub async fn spawn_health_server(
    host: &str,
    port: u16,
    handle: HealthHandle,
    shutdown: Shutdown,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let server = HealthServer::bind(host, port, handle).await?;
    let addr = server.local_addr()?;

    let task = tokio::spawn(async move {
        if let Err(e) = server.run(shutdown).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    Ok((addr, task))
}
