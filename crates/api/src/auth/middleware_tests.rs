//! Unit tests for authentication middleware
//!
//! Tests cover:
//! - Bearer token extraction from the Authorization header
//! - Cookie extraction and name-prefix handling
//! - Role predicates on the request-scoped auth context
//! - Client-kind classification from the User-Agent header
//! - Guard middleware rejecting unauthenticated requests end to end

#[cfg(test)]
mod tests {
    use super::super::jwt::{ClientKind, TokenIssuer};
    use super::super::middleware::*;
    use super::super::session::SessionManager;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn request_with_header(name: &str, value: &str) -> Request {
        Request::builder()
            .header(name, value)
            .body(Body::empty())
            .unwrap()
    }

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Cookie", value.parse().unwrap());
        headers
    }

    /// Auth state that never touches a live database; the pool is lazy.
    fn auth_state() -> AuthState {
        AuthState {
            issuer: TokenIssuer::new(
                "test-access-secret-at-least-32-chars",
                "test-refresh-secret-at-least-32-char",
            ),
            sessions: SessionManager::new("test-session-secret").unwrap(),
            pool: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgresql://localhost/test")
                .unwrap(),
            mobile_user_agent: "SteppingStonesApp".to_string(),
        }
    }

    fn auth_user(role: &str, is_admin: bool) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "jane@test.com".to_string(),
            role: role.to_string(),
            is_admin,
            is_super_admin: false,
            auth_method: AuthMethod::Bearer,
        }
    }

    #[test]
    fn bearer_token_extracted_from_authorization_header() {
        let request = request_with_header("Authorization", "Bearer abc.def.ghi");
        assert_eq!(
            extract_bearer_token(&request),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let request = request_with_header("Authorization", "Basic dXNlcjpwYXNz");
        assert_eq!(extract_bearer_token(&request), None);

        let request = request_with_header("Authorization", "bearer lowercase-scheme");
        assert_eq!(extract_bearer_token(&request), None);
    }

    #[test]
    fn missing_authorization_header_yields_none() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_bearer_token(&request), None);
    }

    #[test]
    fn cookie_extracted_among_multiple() {
        let headers =
            headers_with_cookie("other=1; ss_session=abc.def; ss_refresh_token=tok");

        assert_eq!(
            extract_cookie(&headers, SESSION_COOKIE),
            Some("abc.def".to_string())
        );
        assert_eq!(
            extract_cookie(&headers, REFRESH_COOKIE),
            Some("tok".to_string())
        );
        assert_eq!(extract_cookie(&headers, "absent"), None);
    }

    #[test]
    fn cookie_name_prefix_does_not_match() {
        // `ss_session_old` must not satisfy a lookup for `ss_session`.
        let headers = headers_with_cookie("ss_session_old=stale");
        assert_eq!(extract_cookie(&headers, SESSION_COOKIE), None);
    }

    #[test]
    fn cookie_extraction_without_header_yields_none() {
        assert_eq!(extract_cookie(&HeaderMap::new(), SESSION_COOKIE), None);
    }

    #[test]
    fn role_predicate_matches_exactly() {
        let editor = auth_user("EDITOR", false);

        assert!(editor.has_role_in(&["EDITOR", "ADMIN"]));
        assert!(!editor.has_role_in(&["ADMIN", "SUPERADMIN"]));
        assert!(!editor.has_role_in(&[]));
        // Roles are case-sensitive as stored.
        assert!(!editor.has_role_in(&["editor"]));
    }

    #[test]
    fn admin_flag_is_independent_of_role_list() {
        let admin = auth_user("ADMIN", true);
        let demoted = auth_user("USER", true);

        assert!(admin.is_admin);
        // The admin gate keys off the flag, not the role string.
        assert!(demoted.is_admin);
        assert!(!demoted.has_role_in(&["ADMIN"]));
    }

    // Pool construction spawns sqlx maintenance tasks, so every test that
    // builds an AuthState needs a Tokio runtime.
    #[tokio::test]
    async fn client_kind_classified_from_request_user_agent() {
        let state = auth_state();

        let mobile = request_with_header("User-Agent", "SteppingStonesApp/3.0 (iPhone)");
        assert_eq!(state.client_kind(&mobile), ClientKind::Mobile);

        let web = request_with_header("User-Agent", "Mozilla/5.0 (X11; Linux)");
        assert_eq!(state.client_kind(&web), ClientKind::Web);

        let no_agent = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(state.client_kind(&no_agent), ClientKind::Web);
    }

    #[test]
    fn cookie_names_are_distinct_and_prefixed() {
        assert_ne!(REFRESH_COOKIE, SESSION_COOKIE);
        assert!(REFRESH_COOKIE.starts_with("ss_"));
        assert!(SESSION_COOKIE.starts_with("ss_"));
    }

    fn guarded_app() -> Router {
        Router::new()
            .route("/guarded", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(auth_state(), require_auth))
    }

    #[tokio::test]
    async fn require_auth_rejects_request_without_credentials() {
        let response = guarded_app()
            .oneshot(
                Request::builder()
                    .uri("/guarded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_auth_rejects_garbage_bearer_token() {
        let response = guarded_app()
            .oneshot(
                Request::builder()
                    .uri("/guarded")
                    .header("Authorization", "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_auth_rejects_unsigned_session_cookie() {
        // Signature verification fails before any store lookup.
        let response = guarded_app()
            .oneshot(
                Request::builder()
                    .uri("/guarded")
                    .header("Cookie", format!("{SESSION_COOKIE}={}.deadbeef", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_gate_rejects_request_without_credentials() {
        let app = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(auth_state(), require_admin));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn role_gate_rejects_request_without_credentials() {
        const EDITORIAL: &[&str] = &["EDITOR", "ADMIN"];

        let app = Router::new()
            .route("/editorial", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                auth_state(),
                |state: axum::extract::State<AuthState>, request: Request, next: middleware::Next| {
                    require_role(EDITORIAL, state, request, next)
                },
            ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/editorial")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
