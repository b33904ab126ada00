//! Application state for the relay server

use std::sync::Arc;
use std::time::{Duration, Instant};

use smtp_relay::{RelayConfig, SmtpDispatcher};

use crate::rate_limit::FixedWindowLimiter;

/// Shared per-process state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub dispatcher: Arc<SmtpDispatcher>,
    pub global_limiter: Arc<FixedWindowLimiter>,
    pub email_limiter: Arc<FixedWindowLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: RelayConfig, dispatcher: Arc<SmtpDispatcher>) -> Self {
        let limits = config.rate_limit;

        Self {
            global_limiter: Arc::new(FixedWindowLimiter::new(limits.window, limits.max_requests)),
            email_limiter: Arc::new(FixedWindowLimiter::new(
                limits.window,
                limits.email_max_requests(),
            )),
            config: Arc::new(config),
            dispatcher,
            started_at: Instant::now(),
        }
    }

    /// Transport and internal error text is only shown outside production
    pub fn expose_details(&self) -> bool {
        !self.config.environment.is_production()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
