//! Sliding-window rate limiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::state::AppState;

const WINDOW: Duration = Duration::from_secs(60);

/// In-memory sliding window limiter: request timestamps per key within the
/// last 60 seconds.
#[derive(Default)]
pub struct SlidingWindowRateLimiter {
    requests: DashMap<String, Vec<Instant>>,
}

impl SlidingWindowRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `key`. Returns false when the window is full.
    pub fn check(&self, key: &str, max_requests: u32) -> bool {
        let now = Instant::now();
        let mut entry = self.requests.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);
        if entry.len() >= max_requests as usize {
            return false;
        }
        entry.push(now);
        true
    }
}

/// Per-caller rate limiting, keyed by the presented bearer token.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if state
        .settings
        .auth
        .public_paths
        .iter()
        .any(|p| path.starts_with(p))
    {
        return next.run(request).await;
    }

    let key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("anonymous")
        .to_string();

    let limiter = request
        .extensions()
        .get::<Arc<SlidingWindowRateLimiter>>()
        .cloned();

    if let Some(limiter) = limiter {
        if !limiter.check(&key, state.settings.rate_limit.requests_per_minute) {
            tracing::warn!(key = %key, "rate limited");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, "60")],
                "Rate limit exceeded. Try again later.",
            )
                .into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced_per_key() {
        let limiter = SlidingWindowRateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("key-a", 3));
        }
        assert!(!limiter.check("key-a", 3));
        // Other keys are unaffected.
        assert!(limiter.check("key-b", 3));
    }
}
