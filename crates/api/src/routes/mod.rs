//! Route wiring and HTTP helpers

pub mod auth;
pub mod refresh;

use axum::http::HeaderMap;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auth::require_admin;
use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .route("/auth/login/password", post(auth::password_login))
        .route("/auth/authenticate", post(auth::authenticate))
        .route("/auth/register", post(auth::register))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout/mobile", post(auth::logout_mobile))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/refresh", get(refresh::refresh_web).post(refresh::refresh_web))
        .route("/refresh/mobile", post(refresh::refresh_mobile))
        .route(
            "/auth/update-user",
            put(auth::update_user)
                .layer(middleware::from_fn_with_state(auth_state, require_admin)),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Extract the client IP from proxy headers, falling back to "unknown".
/// Used as the rate-limit key.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> String {
    if let Some(xff) = headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = headers.get("CF-Connecting-IP").and_then(|h| h.to_str().ok()) {
        return ip.to_string();
    }
    if let Some(ip) = headers.get("X-Real-IP").and_then(|h| h.to_str().ok()) {
        return ip.to_string();
    }
    "unknown".to_string()
}

/// Refresh cookies live 24 hours, matching the server-side session TTL.
pub(crate) const COOKIE_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;

/// Build a Set-Cookie value. `SameSite=None` because the web client is
/// served from a different origin; that requires `Secure` outside local dev.
pub(crate) fn build_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=None; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub(crate) fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("X-Real-IP", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(extract_client_ip(&headers), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_unknown() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn cookie_attributes() {
        let cookie = build_cookie("ss_refresh_token", "abc", COOKIE_MAX_AGE_SECONDS, true);
        assert!(cookie.starts_with("ss_refresh_token=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(cookie.contains("Secure"));

        let dev_cookie = build_cookie("ss_refresh_token", "abc", COOKIE_MAX_AGE_SECONDS, false);
        assert!(!dev_cookie.contains("Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let cookie = clear_cookie("ss_session", true);
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.starts_with("ss_session=;"));
    }
}
