//! Sliding-window request limiter with a graduated slow-down stage
//!
//! Every request is counted against a `(method, path, ip)` key. Inside a
//! window the first `delay_after` requests pass untouched, the ones after
//! that are stalled by a fixed delay, and everything past `limit` is
//! rejected with 429. Static asset paths bypass the limiter entirely.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::warn;

use crate::AppState;
use crate::error::WebError;
use crate::gatekeeper::client_ip;
use crate::rate_store::{Anchor, RateStore};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Rolling window length
    pub window: Duration,
    /// Maximum requests per window before rejection
    pub limit: u32,
    /// Requests per window before the slow-down stage starts
    pub delay_after: u32,
    /// Delay applied to each request past `delay_after`
    pub delay: Duration,
    /// Path prefixes that bypass the limiter
    pub exempt_prefixes: Vec<String>,
    /// File extensions that bypass the limiter
    pub exempt_extensions: Vec<String>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            limit: 100,
            delay_after: 50,
            delay: Duration::from_millis(500),
            exempt_prefixes: [
                "/stylesheets/",
                "/fonts/",
                "/images/",
                "/javascripts/",
            ]
            .iter()
            .map(|prefix| prefix.to_string())
            .collect(),
            exempt_extensions: [
                ".css", ".js", ".map", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
                ".woff", ".woff2", ".ttf",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
        }
    }
}

impl RateLimiterConfig {
    /// Create a new RateLimiterConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RATE_LIMIT_WINDOW_SECONDS`: window length (default: 900)
    /// - `RATE_LIMIT_MAX`: requests per window (default: 100)
    /// - `RATE_LIMIT_DELAY_AFTER`: requests before slow-down (default: 50)
    /// - `RATE_LIMIT_DELAY_MS`: slow-down delay in ms (default: 500)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let window = std::env::var("RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.window);

        let limit = std::env::var("RATE_LIMIT_MAX")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.limit);

        let delay_after = std::env::var("RATE_LIMIT_DELAY_AFTER")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.delay_after);

        let delay = std::env::var("RATE_LIMIT_DELAY_MS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.delay);

        Self {
            window,
            limit,
            delay_after,
            delay,
            ..defaults
        }
    }
}

/// Decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Pass the request on, stalling it by `delay` first when non-zero
    Allow { delay: Duration },
    /// Reject with 429
    Deny,
}

/// Sliding-window rate limiter
#[derive(Clone)]
pub struct RateLimiter<S> {
    config: RateLimiterConfig,
    store: S,
}

impl<S: RateStore> RateLimiter<S> {
    /// Create a new rate limiter on top of the given counter store
    pub fn new(config: RateLimiterConfig, store: S) -> Self {
        Self { config, store }
    }

    /// True when the path is a static asset exempt from limiting
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config
            .exempt_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
            || self
                .config
                .exempt_extensions
                .iter()
                .any(|ext| path.ends_with(ext.as_str()))
    }

    /// Count one request and decide whether it passes, stalls, or is denied
    pub async fn check(&self, method: &str, path: &str, ip: &str) -> RateDecision {
        let key = format!("{method}:{path}:{ip}");
        let hit = self
            .store
            .hit(&key, self.config.window, Anchor::WindowStart, None)
            .await;

        if hit.count > self.config.limit {
            RateDecision::Deny
        } else if hit.count > self.config.delay_after {
            RateDecision::Allow {
                delay: self.config.delay,
            }
        } else {
            RateDecision::Allow {
                delay: Duration::ZERO,
            }
        }
    }
}

/// Middleware applying the limiter to every non-exempt request
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    if state.rate_limiter.is_exempt(&path) {
        return next.run(req).await;
    }

    let method = req.method().as_str().to_string();
    let ip = client_ip(req.headers(), req.extensions());

    match state.rate_limiter.check(&method, &path, &ip).await {
        RateDecision::Deny => {
            warn!("Rate limit exceeded: {} {} from {}", method, path, ip);
            WebError::RateLimited.into_response()
        }
        RateDecision::Allow { delay } => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            next.run(req).await
        }
    }
}
