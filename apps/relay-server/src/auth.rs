//! API key authentication
//!
//! The key is read from `X-API-Key` first, then from
//! `Authorization: Bearer <key>`. Comparison against the configured key
//! does not short-circuit on the first differing byte.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Pull the presented API key out of the request headers
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.is_empty())
    {
        return Some(key);
    }

    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let mut parts = authorization.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Compare two secrets without an early exit on mismatch
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter()
        .zip(b)
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Middleware: reject requests without the configured API key
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(presented) = extract_api_key(request.headers()) else {
        warn!(path = %request.uri().path(), "Request without API key");
        return Err(ApiError::AuthMissing);
    };

    if !constant_time_eq(presented.as_bytes(), state.config.api_key.as_bytes()) {
        warn!(path = %request.uri().path(), "Request with invalid API key");
        return Err(ApiError::AuthInvalid);
    }

    Ok(next.run(request).await)
}
