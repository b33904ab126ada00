//! API handlers for the relay server
//!
//! Provides REST endpoints for:
//! - Health and relay reachability
//! - Service metadata and documentation
//! - Authenticated email sending

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, OriginalUri, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::Html,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use smtp_relay::{validate_send_request, EmailSendResult};
use tracing::{debug, info};

use crate::docs::DOCS_PAGE;
use crate::error::ApiError;
use crate::state::AppState;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Health check payload
#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub smtp: SmtpHealth,
    pub timestamp: String,
    /// Seconds since startup
    pub uptime: f64,
}

#[derive(Debug, Serialize)]
pub struct SmtpHealth {
    pub configured: bool,
    pub connected: bool,
}

/// Handler: GET /health
pub async fn handle_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthData>>) {
    let connected = state.dispatcher.verify().await;

    let (status, health, message) = if connected {
        (StatusCode::OK, "healthy", "Service is healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "Service is degraded")
    };

    let data = HealthData {
        status: health,
        smtp: SmtpHealth {
            configured: !state.config.smtp.host.is_empty(),
            connected,
        },
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.uptime().as_secs_f64(),
    };

    let body = ApiResponse {
        success: connected,
        message: message.to_string(),
        data: Some(data),
    };

    (status, Json(body))
}

/// Service metadata
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub success: bool,
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: Endpoints,
    pub documentation: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub health: &'static str,
    pub docs: &'static str,
    pub send_email: &'static str,
    pub test_auth: &'static str,
}

/// Handler: GET /
pub async fn handle_root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        success: true,
        message: "Email Microservice API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: Endpoints {
            health: "GET /health",
            docs: "GET /docs",
            send_email: "POST /api/email/send",
            test_auth: "GET /api/email/test",
        },
        documentation: "Visit /docs for the API documentation",
    })
}

/// Handler: GET /docs
pub async fn handle_docs() -> Html<&'static str> {
    Html(DOCS_PAGE)
}

/// Handler: GET /api/email/test
pub async fn handle_test_auth() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message(
        "Email API is working. Authentication successful.",
    ))
}

/// Handler: POST /api/email/send
pub async fn handle_send_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ApiResponse<EmailSendResult>>, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::MalformedBody(rejection.body_text())
        }
    })?;

    let payload = parse_body(&headers, &body)?;
    let request = validate_send_request(&payload, state.config.max_attachment_bytes)?
        .with_sanitized_html();

    info!(
        recipients = request.recipient_count(),
        attachments = request.attachments.len(),
        "Sending email"
    );

    let result = state
        .dispatcher
        .send(&request)
        .await
        .map_err(|e| ApiError::smtp(e, state.expose_details()))?;

    Ok(Json(ApiResponse::ok("Email sent successfully", result)))
}

/// Fallback: unknown routes
pub async fn handle_not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    debug!(method = %method, path = %uri.path(), "No route");
    ApiError::NotFound {
        method,
        path: uri.path().to_string(),
    }
}

/// Turn the raw body into JSON: form bodies become a flat object, an
/// empty body becomes `{}`, anything else must be JSON
fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    if is_form(headers) {
        return form_to_json(body);
    }

    serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

/// Repeated keys collect into an array, so `to=a@b.com&to=c@d.com` works
fn form_to_json(body: &[u8]) -> Result<Value, ApiError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| ApiError::MalformedBody(e.to_string()))?;

    let mut object = Map::new();
    for (key, value) in pairs {
        match object.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                object.insert(key, Value::String(value));
            }
        }
    }

    Ok(Value::Object(object))
}
