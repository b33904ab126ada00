//! Email relay server
//!
//! Accepts authenticated JSON requests and relays them as email through an
//! upstream SMTP server. Provides REST endpoints for:
//!
//! - Sending email (`POST /api/email/send`)
//! - Checking the API key (`GET /api/email/test`)
//! - Health, metadata and documentation
//!
//! ## Architecture
//!
//! Validation, sanitizing and dispatch live in the `smtp-relay` crate; this
//! binary adds configuration loading, API key authentication, fixed-window
//! rate limiting and the HTTP error taxonomy on top.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::{builder::BoolishValueParser, ArgAction, Parser};
use smtp_relay::{
    config::megabytes_to_bytes, ConfigError, CorsOrigins, Environment, RateLimitSettings,
    RelayConfig, SenderIdentity, SmtpDispatcher, SmtpSettings,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod auth;
mod docs;
mod error;
mod rate_limit;
mod routes;
mod state;

use routes::build_router;
use state::AppState;

const DEFAULT_ENVIRONMENT: &str = "development";

const DEFAULT_LOG_FILTER: &str = "smtp_relay=info,relay_server=info,tower_http=info";

/// In-flight requests get this long to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Command-line arguments; every flag can also come from its environment variable
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "HTTP to SMTP email relay")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Deployment environment: development, production or test
    #[arg(long = "env", env = "APP_ENV")]
    app_env: Option<String>,

    /// Older name for `APP_ENV`, used when that is unset
    #[arg(long, env = "NODE_ENV", hide = true)]
    node_env: Option<String>,

    /// API key clients must present (at least 16 characters)
    #[arg(long, env = "API_KEY", default_value = "", hide_env_values = true, hide_default_value = true)]
    api_key: String,

    /// `*` or a comma-separated list of allowed origins
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    cors_origins: String,

    /// Rate-limit window in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value = "60000")]
    rate_limit_window_ms: u64,

    /// Requests per window per client; the send endpoint allows half
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value = "10")]
    rate_limit_max_requests: u32,

    /// SMTP relay host
    #[arg(long, env = "SMTP_HOST", default_value = "")]
    smtp_host: String,

    /// SMTP relay port
    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    smtp_port: u16,

    /// Use implicit TLS instead of STARTTLS
    #[arg(
        long,
        env = "SMTP_SECURE",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    smtp_secure: bool,

    /// SMTP username
    #[arg(long, env = "SMTP_USER", default_value = "")]
    smtp_user: String,

    /// SMTP password
    #[arg(long, env = "SMTP_PASS", default_value = "", hide_env_values = true, hide_default_value = true)]
    smtp_pass: String,

    /// Sender address for every message
    #[arg(long, env = "SMTP_FROM_EMAIL", default_value = "")]
    smtp_from_email: String,

    /// Sender display name
    #[arg(long, env = "SMTP_FROM_NAME", default_value = "Email Service")]
    smtp_from_name: String,

    /// Largest decoded attachment, in megabytes
    #[arg(long, env = "MAX_ATTACHMENT_SIZE_MB", default_value = "10")]
    max_attachment_size_mb: f64,
}

impl Args {
    fn environment_name(&self) -> &str {
        self.app_env
            .as_deref()
            .or(self.node_env.as_deref())
            .unwrap_or(DEFAULT_ENVIRONMENT)
    }

    fn into_config(self) -> Result<RelayConfig, ConfigError> {
        Ok(RelayConfig {
            port: self.port,
            environment: self.environment_name().parse()?,
            api_key: self.api_key,
            cors_origins: CorsOrigins::parse(&self.cors_origins),
            rate_limit: RateLimitSettings {
                window: Duration::from_millis(self.rate_limit_window_ms),
                max_requests: self.rate_limit_max_requests,
            },
            smtp: SmtpSettings {
                host: self.smtp_host,
                port: self.smtp_port,
                secure: self.smtp_secure,
                username: self.smtp_user,
                password: self.smtp_pass,
            },
            sender: SenderIdentity {
                email: self.smtp_from_email,
                name: self.smtp_from_name,
            },
            max_attachment_bytes: megabytes_to_bytes(self.max_attachment_size_mb),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let host = args.host.clone();

    let log_as_json = args
        .environment_name()
        .parse::<Environment>()
        .map(Environment::is_production)
        .unwrap_or(false);
    init_tracing(log_as_json);

    let config = match args.into_config().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(err) => {
            for issue in err.issues() {
                error!("Invalid configuration: {}", issue);
            }
            std::process::exit(1);
        }
    };

    info!("Starting relay server v{}", smtp_relay::VERSION);
    info!("Environment: {}", config.environment);
    info!(
        "SMTP relay: {}:{} (secure: {})",
        config.smtp.host, config.smtp.port, config.smtp.secure
    );
    info!("Sender: {} <{}>", config.sender.name, config.sender.email);
    info!("CORS origins: {}", config.cors_origins);
    info!(
        "Rate limit: {} requests per {}ms ({} for sends)",
        config.rate_limit.max_requests,
        config.rate_limit.window.as_millis(),
        config.rate_limit.email_max_requests()
    );
    info!("Max attachment size: {}", config.max_attachment_label());

    let dispatcher = Arc::new(
        SmtpDispatcher::new(&config.smtp, &config.sender)
            .context("Failed to configure SMTP transport")?,
    );

    if dispatcher.verify().await {
        info!("SMTP connection verified");
    } else {
        warn!("SMTP connection could not be verified; sends will still be attempted");
    }

    let addr: SocketAddr = format!("{}:{}", host, config.port)
        .parse()
        .context("Invalid bind address")?;
    let state = AppState::new(config, Arc::clone(&dispatcher));
    let app = build_router(state);

    serve(addr, app).await?;

    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => dispatcher.close(),
        Err(_) => warn!("SMTP transport still in use at shutdown; dropping without close"),
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_ansi(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Serve until a shutdown signal, then drain for up to [`SHUTDOWN_GRACE`]
async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    let shutdown = Arc::new(Notify::new());
    let mut server = tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
        }
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("Server task failed")??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    info!("Shutdown signal received, draining in-flight requests");
    shutdown.notify_one();

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(joined) => {
            joined.context("Server task failed")??;
            Ok(())
        }
        Err(_) => {
            error!(
                "In-flight requests did not finish within {}s, forcing exit",
                SHUTDOWN_GRACE.as_secs()
            );
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
