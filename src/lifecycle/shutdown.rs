//! Shutdown coordination for the worker process.

use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

/// What requested the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGTERM or SIGINT.
    Signal,
    /// An explicit `stop()` from code.
    Requested,
}

struct Inner {
    cause: OnceLock<ShutdownCause>,
    tx: watch::Sender<bool>,
}

/// Coordinator for graceful shutdown.
///
/// Cloning yields another handle to the same flag. The first trigger wins;
/// later triggers are ignored.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cause: OnceLock::new(),
                tx,
            }),
        }
    }

    /// Set the flag. Returns `true` only for the call that set it.
    pub fn trigger(&self, cause: ShutdownCause) -> bool {
        let first = self.inner.cause.set(cause).is_ok();
        if first {
            self.inner.tx.send_replace(true);
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.cause.get().is_some()
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        self.inner.cause.get().copied()
    }

    /// Subscribe to the flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Resolve once the flag is set.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown").field("cause", &self.cause()).finish()
    }
}
