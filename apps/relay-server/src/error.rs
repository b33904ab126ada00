//! Error taxonomy for the relay API
//!
//! Every failure a handler or middleware can produce is an [`ApiError`].
//! Its `IntoResponse` impl owns the code, status and body mapping, so all
//! error responses share the `{success, message, error: {code, details}}`
//! shape.

use std::time::Duration;

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use smtp_relay::{SmtpError, ValidationErrors, ViolationKind};
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key missing")]
    AuthMissing,

    #[error("API key invalid")]
    AuthInvalid,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, window: Duration },

    #[error("Email rate limit exceeded")]
    EmailRateLimited,

    #[error("{error}")]
    Smtp {
        error: SmtpError,
        expose_details: bool,
    },

    #[error("Endpoint not found: {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        expose_details: bool,
    },
}

impl ApiError {
    pub fn smtp(error: SmtpError, expose_details: bool) -> Self {
        Self::Smtp {
            error,
            expose_details,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthMissing => "AUTH_MISSING",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::Validation(errors) => match errors.common_kind() {
                Some(ViolationKind::AttachmentTooLarge) => "ATTACHMENT_TOO_LARGE",
                Some(ViolationKind::InvalidAttachment) => "INVALID_ATTACHMENT",
                _ => "VALIDATION_ERROR",
            },
            Self::MalformedBody(_) => "VALIDATION_ERROR",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::EmailRateLimited => "EMAIL_RATE_LIMIT_EXCEEDED",
            Self::Smtp { error, .. } => error.code(),
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthMissing | Self::AuthInvalid => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } | Self::EmailRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Smtp { error, .. } if error.is_upstream() => StatusCode::BAD_GATEWAY,
            Self::Smtp { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::AuthMissing => "Authentication required".to_string(),
            Self::AuthInvalid => "Invalid API key".to_string(),
            Self::Validation(_) => "Validation failed".to_string(),
            Self::MalformedBody(_) => "Invalid JSON in request body".to_string(),
            Self::PayloadTooLarge => "Request body too large".to_string(),
            Self::RateLimited { .. } => "Too many requests".to_string(),
            Self::EmailRateLimited => "Email rate limit exceeded".to_string(),
            Self::Smtp { error, .. } => error.summary().to_string(),
            Self::NotFound { .. } => "Endpoint not found".to_string(),
            Self::Internal {
                message,
                expose_details,
            } => {
                if *expose_details {
                    message.clone()
                } else {
                    "An unexpected error occurred".to_string()
                }
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::AuthMissing => Some(
                "API key is required. Provide it via Authorization header (Bearer token) \
                 or X-API-Key header."
                    .to_string(),
            ),
            Self::AuthInvalid => Some("The provided API key is invalid.".to_string()),
            Self::Validation(errors) => Some(errors.to_string()),
            Self::MalformedBody(_) => Some("The request body contains invalid JSON.".to_string()),
            Self::PayloadTooLarge => {
                Some("The request body exceeds the maximum allowed size.".to_string())
            }
            Self::RateLimited { limit, window } => Some(format!(
                "You have exceeded the {} requests in {} seconds limit.",
                limit,
                window.as_secs_f64()
            )),
            Self::EmailRateLimited => Some(
                "You are sending emails too frequently. Please wait before trying again."
                    .to_string(),
            ),
            Self::Smtp {
                error,
                expose_details,
            } => Some(if *expose_details {
                error.detail().to_string()
            } else {
                error.public_detail().to_string()
            }),
            Self::NotFound { method, path } => {
                Some(format!("The endpoint {method} {path} does not exist."))
            }
            Self::Internal {
                message,
                expose_details,
            } => expose_details.then(|| message.clone()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Smtp { error, .. } => tracing::error!(code = error.code(), "SMTP error: {}", error),
            Self::Internal { message, .. } => tracing::error!("Internal error: {}", message),
            Self::MalformedBody(reason) => tracing::debug!("Malformed body: {}", reason),
            _ => tracing::debug!(code = self.code(), "Request rejected: {}", self),
        }

        let body = ErrorResponse {
            success: false,
            message: self.message(),
            error: ErrorDetail {
                code: self.code(),
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtp_relay::validate_send_request;

    fn validation_error(body: serde_json::Value, max_bytes: usize) -> ApiError {
        ApiError::Validation(validate_send_request(&body, max_bytes).unwrap_err())
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::AuthMissing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::smtp(SmtpError::Connection("refused".into()), true).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::smtp(SmtpError::Auth("535".into()), true).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::smtp(SmtpError::Send("550".into()), true).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_smtp_details_hidden_in_production() {
        let error = ApiError::smtp(SmtpError::Auth("535 5.7.8 user@x bad".into()), false);
        assert_eq!(
            error.details().as_deref(),
            Some("The email server rejected the credentials.")
        );

        let error = ApiError::smtp(SmtpError::Auth("535 5.7.8 user@x bad".into()), true);
        assert_eq!(error.details().as_deref(), Some("535 5.7.8 user@x bad"));
    }

    #[test]
    fn test_internal_message_hidden_in_production() {
        let error = ApiError::Internal {
            message: "pool exploded".into(),
            expose_details: false,
        };
        assert_eq!(error.message(), "An unexpected error occurred");
        assert_eq!(error.code(), "INTERNAL_ERROR");
        assert_eq!(error.details(), None);
    }

    #[test]
    fn test_internal_details_outside_production() {
        let error = ApiError::Internal {
            message: "pool exploded".into(),
            expose_details: true,
        };
        assert_eq!(error.message(), "pool exploded");
        assert_eq!(error.details().as_deref(), Some("pool exploded"));
    }

    #[test]
    fn test_attachment_only_failures_get_narrow_codes() {
        let too_large = validation_error(
            serde_json::json!({
                "to": "a@b.com",
                "subject": "Hi",
                "text": "x",
                "attachments": [{"filename": "a.bin", "content": "QUFBQUFBQUE="}]
            }),
            4,
        );
        assert_eq!(too_large.code(), "ATTACHMENT_TOO_LARGE");

        let malformed = validation_error(
            serde_json::json!({
                "to": "a@b.com",
                "subject": "Hi",
                "text": "x",
                "attachments": [{"filename": "a.bin", "content": "%%%"}]
            }),
            1024,
        );
        assert_eq!(malformed.code(), "INVALID_ATTACHMENT");

        let mixed = validation_error(
            serde_json::json!({
                "to": "nope",
                "subject": "Hi",
                "text": "x",
                "attachments": [{"filename": "a.bin", "content": "%%%"}]
            }),
            1024,
        );
        assert_eq!(mixed.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_rate_limit_details() {
        let error = ApiError::RateLimited {
            limit: 10,
            window: Duration::from_secs(60),
        };
        assert_eq!(
            error.details().as_deref(),
            Some("You have exceeded the 10 requests in 60 seconds limit.")
        );

        let fractional = ApiError::RateLimited {
            limit: 3,
            window: Duration::from_millis(1500),
        };
        assert_eq!(
            fractional.details().as_deref(),
            Some("You have exceeded the 3 requests in 1.5 seconds limit.")
        );
    }

    #[test]
    fn test_not_found_details() {
        let error = ApiError::NotFound {
            method: Method::GET,
            path: "/nope".into(),
        };
        assert_eq!(
            error.details().as_deref(),
            Some("The endpoint GET /nope does not exist.")
        );
    }
}
