//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use resilience_core::config::{BackoffConfig, WorkerConfig};
use resilience_core::health::{spawn_health_server, HealthHandle};
use resilience_core::lifecycle::Shutdown;
use resilience_core::ratelimit::{rate_limit_middleware, RateLimitState};

/// Client that never reuses connections between requests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Worker settings with zero poll intervals and millisecond backoff.
pub fn fast_worker_config(max_retries: u32) -> (WorkerConfig, BackoffConfig) {
    let worker = WorkerConfig {
        name: "test".to_string(),
        idle_interval_secs: 0.0,
        active_interval_secs: 0.0,
        max_retries,
        health_port: None,
    };
    let backoff = BackoffConfig {
        min_delay_secs: 0.001,
        max_delay_secs: 0.005,
        multiplier: 2.0,
        jitter: 0.0,
    };
    (worker, backoff)
}

/// Start a probe server on an ephemeral port.
pub async fn start_health_server(handle: HealthHandle) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let (addr, _task) = spawn_health_server("127.0.0.1", 0, handle, shutdown.clone())
        .await
        .unwrap();
    (addr, shutdown)
}

/// Serve a small app behind the rate limiting middleware on an ephemeral port.
pub async fn start_limited_app(state: RateLimitState) -> SocketAddr {
    let app = Router::new()
        .route("/items", get(|| async { "items" }))
        .route("/api/v1/auth/login", get(|| async { "login" }))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await;
    });
    addr
}

/// Start a programmable mock backend; `f` picks the status and body per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    429 => "429 Too Many Requests",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start a fake shared store speaking RESP on an ephemeral port.
///
/// `PING` gets `+PONG`, script calls (`EVAL`/`EVALSHA`) get whatever raw
/// reply `on_script` returns, and anything else gets `+OK`.
pub async fn start_fake_store<F>(on_script: F) -> SocketAddr
where
    F: Fn() -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let on_script = Arc::new(on_script);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let on_script = on_script.clone();
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut reader = BufReader::new(read);
                while let Some(args) = read_command(&mut reader).await {
                    let command = args.first().map(|c| c.to_uppercase()).unwrap_or_default();
                    let reply = match command.as_str() {
                        "PING" => "+PONG\r\n".to_string(),
                        "EVAL" | "EVALSHA" => on_script(),
                        _ => "+OK\r\n".to_string(),
                    };
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(args)
}
