//! Service configuration
//!
//! [`RelayConfig`] is built once at startup (the server fills it from flags
//! and environment variables) and is read-only afterwards. [`RelayConfig::validate`]
//! reports every problem at once so the process can print them all and exit.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Shortest API key the service accepts
pub const MIN_API_KEY_LEN: usize = 16;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Deployment environment, from `APP_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Production hides transport error text from API responses
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::Invalid(vec![format!(
                "APP_ENV: expected one of development, production, test (got '{other}')"
            )])),
        }
    }
}

/// Allowed CORS origins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// `*` - any origin, no credentials
    Any,
    /// Exact origins, credentials allowed
    List(Vec<String>),
}

impl CorsOrigins {
    /// Parse `*` or a comma-separated origin list.
    ///
    /// A list that contains `*` anywhere is treated as [`CorsOrigins::Any`].
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        if origins.iter().any(|origin| origin == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

impl fmt::Display for CorsOrigins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::List(origins) => f.write_str(&origins.join(", ")),
        }
    }
}

/// Fixed-window rate limit settings shared by both limiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitSettings {
    /// The send endpoint gets half the global budget, never less than one
    pub fn email_max_requests(&self) -> u32 {
        (self.max_requests / 2).max(1)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(60_000),
            max_requests: 10,
        }
    }
}

/// Connection parameters for the upstream SMTP relay
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Implicit TLS (SMTPS) instead of STARTTLS
    pub secure: bool,
    pub username: String,
    pub password: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            secure: false,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The `From` identity every relayed message carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub email: String,
    pub name: String,
}

impl Default for SenderIdentity {
    fn default() -> Self {
        Self {
            email: String::new(),
            name: "Email Service".to_string(),
        }
    }
}

/// Process-wide configuration
#[derive(Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub environment: Environment,
    pub api_key: String,
    pub cors_origins: CorsOrigins,
    pub rate_limit: RateLimitSettings,
    pub smtp: SmtpSettings,
    pub sender: SenderIdentity,
    pub max_attachment_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            environment: Environment::default(),
            api_key: String::new(),
            cors_origins: CorsOrigins::Any,
            rate_limit: RateLimitSettings::default(),
            smtp: SmtpSettings::default(),
            sender: SenderIdentity::default(),
            max_attachment_bytes: megabytes_to_bytes(10.0),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("api_key", &"<redacted>")
            .field("cors_origins", &self.cors_origins)
            .field("rate_limit", &self.rate_limit)
            .field("smtp", &self.smtp)
            .field("sender", &self.sender)
            .field("max_attachment_bytes", &self.max_attachment_bytes)
            .finish()
    }
}

impl RelayConfig {
    /// Check every required value, collecting all problems
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.api_key.chars().count() < MIN_API_KEY_LEN {
            issues.push(format!(
                "API_KEY: must be at least {MIN_API_KEY_LEN} characters"
            ));
        }
        if self.smtp.host.trim().is_empty() {
            issues.push("SMTP_HOST: is required".to_string());
        }
        if self.smtp.username.is_empty() {
            issues.push("SMTP_USER: is required".to_string());
        }
        if self.smtp.password.is_empty() {
            issues.push("SMTP_PASS: is required".to_string());
        }
        if !email_address::EmailAddress::is_valid(&self.sender.email) {
            issues.push("SMTP_FROM_EMAIL: must be a valid email".to_string());
        }
        if self.rate_limit.window.is_zero() {
            issues.push("RATE_LIMIT_WINDOW_MS: must be greater than zero".to_string());
        }
        if self.rate_limit.max_requests == 0 {
            issues.push("RATE_LIMIT_MAX_REQUESTS: must be greater than zero".to_string());
        }
        if self.max_attachment_bytes == 0 {
            issues.push("MAX_ATTACHMENT_SIZE_MB: must be greater than zero".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Human-readable attachment ceiling, e.g. `10MB`
    pub fn max_attachment_label(&self) -> String {
        format_megabytes(self.max_attachment_bytes)
    }
}

/// Convert the `MAX_ATTACHMENT_SIZE_MB` value to bytes; negative or NaN become 0
pub fn megabytes_to_bytes(mb: f64) -> usize {
    if mb.is_finite() && mb > 0.0 {
        (mb * BYTES_PER_MB) as usize
    } else {
        0
    }
}

pub(crate) fn format_megabytes(bytes: usize) -> String {
    let mb = bytes as f64 / BYTES_PER_MB;
    if mb.fract() == 0.0 {
        format!("{}MB", mb as u64)
    } else {
        format!("{mb:.2}MB")
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    pub fn issues(&self) -> &[String] {
        match self {
            Self::Invalid(issues) => issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid_config() -> RelayConfig {
        RelayConfig {
            api_key: "0123456789abcdef".to_string(),
            smtp: SmtpSettings {
                host: "smtp.example.com".to_string(),
                username: "relay".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            },
            sender: SenderIdentity {
                email: "noreply@example.com".to_string(),
                name: "Relay".to_string(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_reports_every_missing_value() {
        let err = RelayConfig::default().validate().unwrap_err();
        assert_eq!(
            err.issues(),
            &[
                "API_KEY: must be at least 16 characters".to_string(),
                "SMTP_HOST: is required".to_string(),
                "SMTP_USER: is required".to_string(),
                "SMTP_PASS: is required".to_string(),
                "SMTP_FROM_EMAIL: must be a valid email".to_string(),
            ]
        );
    }

    #[test]
    fn test_short_api_key_rejected() {
        let mut config = valid_config();
        config.api_key = "too-short".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert!(err.issues()[0].starts_with("API_KEY"));
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let mut config = valid_config();
        config.sender.email = "not-an-email".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = valid_config();
        config.rate_limit.max_requests = 0;
        config.rate_limit.window = Duration::ZERO;
        config.max_attachment_bytes = 0;
        assert_eq!(config.validate().unwrap_err().issues().len(), 3);
    }

    #[test]
    fn test_email_limit_is_half_of_global() {
        let mut settings = RateLimitSettings::default();
        assert_eq!(settings.email_max_requests(), 5);
        settings.max_requests = 7;
        assert_eq!(settings.email_max_requests(), 3);
        settings.max_requests = 1;
        assert_eq!(settings.email_max_requests(), 1);
    }

    #[test]
    fn test_cors_origins_parsing() {
        assert_eq!(CorsOrigins::parse("*"), CorsOrigins::Any);
        assert_eq!(
            CorsOrigins::parse("https://a.example, https://b.example"),
            CorsOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
        assert_eq!(
            CorsOrigins::parse("https://a.example,*"),
            CorsOrigins::Any
        );
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(" Test ".parse::<Environment>(), Ok(Environment::Test));
        assert!("staging".parse::<Environment>().is_err());
        assert!(Environment::Production.is_production());
        assert!(!Environment::Development.is_production());
    }

    #[test]
    fn test_megabytes_conversion() {
        assert_eq!(megabytes_to_bytes(10.0), 10 * 1024 * 1024);
        assert_eq!(megabytes_to_bytes(0.5), 512 * 1024);
        assert_eq!(megabytes_to_bytes(-1.0), 0);
        assert_eq!(megabytes_to_bytes(f64::NAN), 0);
        assert_eq!(format_megabytes(10 * 1024 * 1024), "10MB");
        assert_eq!(format_megabytes(512 * 1024), "0.50MB");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid_config());
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
