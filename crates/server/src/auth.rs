//! Bearer-key authentication middleware.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Warn only once when running without authentication.
static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

/// Check `Authorization: Bearer <key>` against the configured key set.
///
/// - No keys configured: auth is disabled (one warning at first request).
/// - Paths listed in `auth.public_paths` bypass the check.
/// - Comparison is constant-time per key.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let auth = &state.settings.auth;

    if auth.api_keys.is_empty() {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "API authentication is disabled; configure RELIA__AUTH__API_KEYS for production"
            );
        }
        return next.run(request).await;
    }

    let path = request.uri().path();
    if auth.public_paths.iter().any(|p| path.starts_with(p)) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(key) if auth
            .api_keys
            .iter()
            .any(|expected| constant_time_compare(key.as_bytes(), expected.as_bytes())) =>
        {
            next.run(request).await
        }
        Some(_) => {
            tracing::warn!("invalid API key");
            (StatusCode::UNAUTHORIZED, "Invalid API key").into_response()
        }
        None => (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response(),
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
        assert!(!constant_time_compare(b"", b"x"));
        assert!(constant_time_compare(b"", b""));
    }
}
