//! OS signal handling.
//!
//! SIGTERM and SIGINT both request a graceful shutdown. No other signals are
//! handled.

use tokio::task::JoinHandle;

use crate::lifecycle::{Shutdown, ShutdownCause};

/// Spawn a task that triggers `shutdown` on the first termination signal.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = tokio::select! {
            name = wait_for_signal() => name,
            _ = shutdown.wait() => return,
        };

        tracing::info!(signal, "Shutdown signal received");
        shutdown.trigger(ShutdownCause::Signal);
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        name = wait_for_ctrl_c() => name,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
