//! Router assembly
//!
//! ```text
//! TraceLayer → CatchPanic → CORS → security headers → body limit → global limiter
//!   GET  /                 metadata
//!   GET  /health           relay status (skipped by the global limiter)
//!   GET  /docs             documentation page
//!   GET  /api/email/test   API key
//!   POST /api/email/send   API key → send limiter
//! ```

use std::any::Any;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use smtp_relay::CorsOrigins;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::api::{
    handle_docs, handle_health, handle_not_found, handle_root, handle_send_email,
    handle_test_auth,
};
use crate::auth::{require_api_key, API_KEY_HEADER};
use crate::error::ApiError;
use crate::rate_limit::{limit_email, limit_global};
use crate::state::AppState;

/// Largest request body accepted, in bytes
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:";

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let send = post(handle_send_email)
        .fallback(handle_not_found)
        .route_layer(from_fn_with_state(state.clone(), limit_email))
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    let test = get(handle_test_auth)
        .fallback(handle_not_found)
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    let email_routes = Router::new().route("/send", send).route("/test", test);

    let security_headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ));

    let expose_details = state.expose_details();

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/docs", get(handle_docs))
        .nest("/api/email", email_routes)
        .fallback(handle_not_found)
        .layer(from_fn_with_state(state.clone(), limit_global))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(security_headers)
        .layer(cors_layer(&state.config.cors_origins))
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| panic_response(panic, expose_details),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .max_age(CORS_MAX_AGE);

    match origins {
        CorsOrigins::Any => cors.allow_origin(AnyOrigin),
        CorsOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            cors.allow_origin(AllowOrigin::list(allowed))
                .allow_credentials(true)
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_details: bool) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    ApiError::Internal {
        message,
        expose_details,
    }
    .into_response()
}
