//! Fixed-window rate limiting keyed by client IP
//!
//! Two limiters run in front of the API: a global one over every route
//! except `/health`, and a stricter one on the send endpoint. A window
//! starts with a key's first request and resets once `window` has elapsed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Once the table holds this many keys, expired windows are dropped
const PRUNE_THRESHOLD: usize = 4096;

const HEALTH_PATH: &str = "/health";

static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the key's window resets
    pub reset_after: Duration,
}

impl RateDecision {
    /// Seconds until reset, rounded up
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Write `RateLimit-*` headers; existing values are kept unless `overwrite`
    fn apply(&self, headers: &mut HeaderMap, overwrite: bool) {
        let values = [
            (&RATELIMIT_LIMIT, u64::from(self.limit)),
            (&RATELIMIT_REMAINING, u64::from(self.remaining)),
            (&RATELIMIT_RESET, self.reset_secs()),
        ];
        for (name, value) in values {
            if overwrite || !headers.contains_key(name) {
                headers.insert(name.clone(), HeaderValue::from(value));
            }
        }
        if !self.allowed {
            headers.insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(self.reset_secs()),
            );
        }
    }
}

/// Counts requests per key within a fixed window
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    entries: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request for `key` and decide whether it may proceed
    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut entries = self.entries.lock().await;

        if entries.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            entries.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = entries.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }

        RateDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// First `X-Forwarded-For` hop, else the peer address, else `unknown`
pub fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware: global limiter, every path except `/health`
pub async fn limit_global(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let key = client_key(&request);
    let limiter = &state.global_limiter;
    let decision = limiter.check(&key).await;

    if !decision.allowed {
        warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        let mut response = ApiError::RateLimited {
            limit: limiter.max_requests(),
            window: limiter.window(),
        }
        .into_response();
        decision.apply(response.headers_mut(), true);
        return response;
    }

    let mut response = next.run(request).await;
    decision.apply(response.headers_mut(), false);
    response
}

/// Middleware: the stricter limiter on the send endpoint
pub async fn limit_email(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    let decision = state.email_limiter.check(&key).await;

    if !decision.allowed {
        warn!(client = %key, "Email rate limit exceeded");
        let mut response = ApiError::EmailRateLimited.into_response();
        decision.apply(response.headers_mut(), true);
        return response;
    }

    let mut response = next.run(request).await;
    decision.apply(response.headers_mut(), true);
    response
}
