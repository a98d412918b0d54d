//! Rate limiting middleware.
//!
//! Keys requests by authenticated subject (or client IP) and path, and
//! answers 429 with a `Retry-After` once the window is full.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::ratelimit::{build_limiter, RateLimitError, RateLimitPolicy, RateLimiter};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Identity set by an upstream authentication layer.
///
/// When present it replaces the client address in the admission key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub String);

/// Shared state for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<dyn RateLimiter>,
    pub policy: Arc<RateLimitPolicy>,
    pub enabled: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<dyn RateLimiter>, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy),
            enabled: true,
        }
    }

    /// Build the limiter and policy named by the configuration.
    pub async fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let policy = RateLimitPolicy::from_config(config)?;
        let limiter = build_limiter(config).await;
        Ok(Self {
            limiter,
            policy: Arc::new(policy),
            enabled: config.enabled,
        })
    }
}

fn client_identity(request: &Request<Body>) -> String {
    if let Some(subject) = request.extensions().get::<AuthenticatedSubject>() {
        return subject.0.clone();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn insert_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset: u64) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(reset));
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let key = format!("{}:{}", client_identity(&request), path);
    let limit = state.policy.limit_for(&path);

    let decision = state
        .limiter
        .is_rate_limited(&key, limit.max_requests, limit.window_secs)
        .await;
    metrics::record_rate_limit(decision.limited);

    if decision.limited {
        tracing::warn!(key = %key, limit = limit.max_requests, retry_after = decision.reset_secs, "Rate limit exceeded");
        let body = Json(json!({
            "detail": "Rate limit exceeded",
            "retry_after": decision.reset_secs,
        }));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        let headers = response.headers_mut();
        insert_limit_headers(headers, limit.max_requests, 0, decision.reset_secs);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_secs));
        return response;
    }

    let mut response = next.run(request).await;
    insert_limit_headers(
        response.headers_mut(),
        limit.max_requests,
        decision.remaining,
        decision.reset_secs,
    );
    response
}
