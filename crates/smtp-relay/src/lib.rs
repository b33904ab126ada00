//! SMTP relay core - validation, sanitizing and pooled dispatch
//!
//! This crate holds the parts of the mail relay service that have actual
//! logic in them. The HTTP server in `apps/relay-server` is a thin layer
//! over it.
//!
//! ## Pipeline
//!
//! ```text
//! JSON body → validation (normalize recipients, decode attachments)
//!           → sanitize (strip scripts, handlers, javascript:/data: URLs)
//!           → SmtpDispatcher (pooled lettre transport) → SMTP relay
//! ```
//!
//! ## Modules
//!
//! - [`config`] - typed, validated service configuration
//! - [`types`] - normalized request and result types
//! - [`validation`] - payload validation with aggregate field violations
//! - [`sanitize`] - best-effort HTML sanitizer
//! - [`smtp`] - dispatcher and transport error classification

pub mod config;
pub mod sanitize;
pub mod smtp;
pub mod types;
pub mod validation;

pub use config::{
    ConfigError, CorsOrigins, Environment, RateLimitSettings, RelayConfig, SenderIdentity,
    SmtpSettings,
};
pub use sanitize::sanitize_html;
pub use smtp::{MessageComposer, SmtpDispatcher, SmtpError};
pub use types::{Attachment, EmailAddress, EmailBody, EmailSendResult, SendEmailRequest};
pub use validation::{validate_send_request, FieldViolation, ValidationErrors, ViolationKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
