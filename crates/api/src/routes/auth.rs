//! Authentication routes
//!
//! One auth service serves both client kinds; `ClientKind` only varies the
//! access-token TTL, cookie-vs-body refresh delivery, and whether the
//! human-verification challenge applies.

use std::time::Duration;

use axum::extract::{Extension, State};
use axum::http::header::{SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::one_time_code::{self, CodeError};
use crate::auth::refresh::{delete_refresh_token_by_value, mobile_logout};
use crate::auth::session::{delete_session, issue_session, IssuedSession};
use crate::auth::middleware::extract_cookie;
use crate::auth::{hash_password, verify_password, AuthUser, ClientKind, REFRESH_COOKIE, SESSION_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::models::{find_user_by_email, role, PublicUser};
use crate::email;
use crate::routes::{build_cookie, clear_cookie, extract_client_ip, COOKIE_MAX_AGE_SECONDS};
use crate::state::AppState;

/// Login attempts allowed per client per rolling window.
const LOGIN_ATTEMPT_LIMIT: u32 = 5;
const LOGIN_ATTEMPT_WINDOW: Duration = Duration::from_secs(60);

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    /// Human-verification challenge token; required for non-mobile clients.
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub email: String,
    pub one_time_code: String,
    /// Explicit client-kind override; User-Agent classification otherwise.
    pub is_mobile: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub accept_terms_and_conditions: bool,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileLogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    #[serde(rename = "type")]
    pub token_type: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: String,
    pub email_verified: bool,
}

// =============================================================================
// Helpers
// =============================================================================

/// Structural email check: one `@`, non-empty local part, dotted domain.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn client_kind(state: &AppState, headers: &HeaderMap) -> ClientKind {
    let user_agent = headers.get(USER_AGENT).and_then(|h| h.to_str().ok());
    ClientKind::from_user_agent(user_agent, &state.config.mobile_user_agent)
}

/// Shape the session response per client kind: web gets the refresh token
/// and session id as cookies, mobile gets the refresh token in the body.
fn session_response(state: &AppState, issued: IssuedSession, kind: ClientKind) -> Response {
    let mut body = json!({
        "user": PublicUser::from(&issued.user),
        "token": issued.access_token,
        "success": true,
    });

    match kind {
        ClientKind::Mobile => {
            body["refreshToken"] = Value::String(issued.refresh_token);
            Json(body).into_response()
        }
        ClientKind::Web => {
            let secure = state.config.cookie_secure;
            let cookies = AppendHeaders(vec![
                (
                    SET_COOKIE,
                    build_cookie(
                        REFRESH_COOKIE,
                        &issued.refresh_token,
                        COOKIE_MAX_AGE_SECONDS,
                        secure,
                    ),
                ),
                (
                    SET_COOKIE,
                    build_cookie(
                        SESSION_COOKIE,
                        &state.sessions.cookie_value(issued.session_id),
                        COOKIE_MAX_AGE_SECONDS,
                        secure,
                    ),
                ),
            ]);
            (cookies, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /auth/login`. Starts the one-time-code handshake.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    if !is_valid_email(&req.email) {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }

    // Rate limit before any store access.
    let client_ip = extract_client_ip(&headers);
    if !state
        .rate_limiter
        .check(&client_ip, LOGIN_ATTEMPT_LIMIT, LOGIN_ATTEMPT_WINDOW)
        .await
    {
        tracing::warn!(client_ip = %client_ip, "Login rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    // Non-mobile callers must prove they are human before any token work.
    let kind = client_kind(&state, &headers);
    if !kind.is_mobile() {
        let challenge = req.token.as_deref().unwrap_or_default();
        if !state.human_verifier.verify(challenge).await {
            return Err(ApiError::BadRequest(
                "Human verification failed".to_string(),
            ));
        }
    }

    // Generic message: the response must not distinguish unknown emails
    // beyond registration status.
    let user = find_user_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Email not registered".to_string()))?;

    let code = one_time_code::issue_code(&state.pool, user.id).await?;

    let (subject, html) = email::login_code_message(&code);
    state
        .mailer
        .send(&user.email, &subject, &html)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(Json(json!({
        "message": "Login code sent",
        "success": true,
    })))
}

/// `POST /auth/authenticate`. Exchanges a one-time code for a session.
pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AuthenticateRequest>,
) -> ApiResult<Response> {
    let user = one_time_code::exchange_code(&state.pool, &req.email, &req.one_time_code)
        .await
        .map_err(|e| match e {
            CodeError::InvalidCode => ApiError::Unauthorized("Invalid code".to_string()),
            CodeError::CodeExpired => ApiError::Unauthorized("Code expired".to_string()),
            CodeError::Store(e) => e.into(),
        })?;

    let kind = match req.is_mobile {
        Some(true) => ClientKind::Mobile,
        Some(false) => ClientKind::Web,
        None => client_kind(&state, &headers),
    };
    let issued = issue_session(&state.pool, &state.issuer, user, kind).await?;

    Ok(session_response(&state, issued, kind))
}

/// `POST /auth/login/password`. Legacy password login.
pub async fn password_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordLoginRequest>,
) -> ApiResult<Response> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = find_user_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(invalid)?;

    // Placeholder accounts (newsletter/partner sign-up) have no hash and can
    // never authenticate here.
    let stored_hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    if !verify_password(&req.password, stored_hash) {
        return Err(invalid());
    }

    let kind = client_kind(&state, &headers);
    let issued = issue_session(&state.pool, &state.issuer, user, kind).await?;

    Ok(session_response(&state, issued, kind))
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Response> {
    if !req.accept_terms_and_conditions {
        return Err(ApiError::BadRequest(
            "You must accept the terms and conditions".to_string(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    if !is_valid_email(&req.email) {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }

    let password_hash = match req.password.as_deref() {
        Some(password) => Some(hash_password(password).map_err(|_| ApiError::Internal)?),
        None => None,
    };

    let user_id = match find_user_by_email(&state.pool, &req.email).await? {
        Some(existing) if existing.password_hash.is_some() => {
            return Err(ApiError::BadRequest(
                "Email already registered".to_string(),
            ));
        }
        Some(placeholder) => {
            // Upgrade a newsletter/partner placeholder into a full account.
            sqlx::query(
                r#"
                UPDATE users
                SET name = $2,
                    password_hash = $3,
                    accepted_terms_at = NOW(),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(placeholder.id)
            .bind(req.name.trim())
            .bind(&password_hash)
            .execute(&state.pool)
            .await?;

            tracing::info!(user_id = %placeholder.id, "Placeholder account upgraded");
            placeholder.id
        }
        None => {
            let user_id: uuid::Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO users (name, email, password_hash, role, accepted_terms_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING id
                "#,
            )
            .bind(req.name.trim())
            .bind(&req.email)
            .bind(&password_hash)
            .bind(role::USER)
            .fetch_one(&state.pool)
            .await?;

            tracing::info!(user_id = %user_id, "User registered");
            user_id
        }
    };

    let verification_token = state
        .issuer
        .issue_verification_token(user_id)
        .map_err(|_| ApiError::Internal)?;
    one_time_code::store_verification_token(&state.pool, user_id, &verification_token).await?;

    let (subject, html) = email::verification_message(&verification_token);
    state
        .mailer
        .send(&req.email, &subject, &html)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful, please verify your email",
            "success": true,
        })),
    )
        .into_response())
}

/// `POST /auth/verify-email`
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<Json<Value>> {
    if req.token_type != "EMAIL" {
        return Err(ApiError::BadRequest("Unsupported token type".to_string()));
    }

    let claims = state
        .issuer
        .verify_verification_token(&req.token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    // The stored row is consumed exactly once; a replay fails here.
    let consumed =
        one_time_code::consume_verification_token(&state.pool, claims.sub, &req.token).await?;
    if !consumed {
        return Err(ApiError::Unauthorized(
            "Invalid or expired token".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(claims.sub)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %claims.sub, "Email verified");

    Ok(Json(json!({
        "message": "Email verified",
        "success": true,
    })))
}

/// `POST /auth/logout`. Web logout. Idempotent: responds 204 whether or not
/// any server-side state was found, and always clears both cookies.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = extract_cookie(&headers, REFRESH_COOKIE) {
        delete_refresh_token_by_value(&state.pool, &token).await?;
    }
    if let Some(cookie) = extract_cookie(&headers, SESSION_COOKIE) {
        if let Some(session_id) = state.sessions.parse_cookie(&cookie) {
            delete_session(&state.pool, session_id).await?;
        }
    }

    let secure = state.config.cookie_secure;
    let cookies = AppendHeaders(vec![
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE, secure)),
        (SET_COOKIE, clear_cookie(SESSION_COOKIE, secure)),
    ]);

    Ok((StatusCode::NO_CONTENT, cookies).into_response())
}

/// `POST /auth/logout/mobile`. Removes the refresh token and the online
/// presence record atomically.
pub async fn logout_mobile(
    State(state): State<AppState>,
    Json(req): Json<MobileLogoutRequest>,
) -> ApiResult<StatusCode> {
    mobile_logout(&state.pool, &req.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /auth/update-user`. Admin-gated email-verification override.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<Value>> {
    let updated = sqlx::query(
        "UPDATE users SET email_verified = $2, updated_at = NOW() WHERE email = $1",
    )
    .bind(&req.email)
    .bind(req.email_verified)
    .execute(&state.pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(
        admin_id = %admin.user_id,
        target_email = %req.email,
        email_verified = req.email_verified,
        "User updated by admin"
    );

    Ok(Json(json!({
        "message": "User updated",
        "success": true,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("jane@test.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
    }

    #[test]
    fn email_validation_rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@missing-local.com"));
        assert!(!is_valid_email("missing-domain@"));
        assert!(!is_valid_email("no-dot@domain"));
        assert!(!is_valid_email("dot@.leading"));
        assert!(!is_valid_email("space in@local.com"));
    }

    #[test]
    fn register_requests_parse_camel_case() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "name": "Jane",
            "email": "jane@test.com",
            "acceptTermsAndConditions": false,
        }))
        .unwrap();

        assert_eq!(req.name, "Jane");
        assert!(!req.accept_terms_and_conditions);
        assert!(req.password.is_none());
    }

    #[test]
    fn verify_email_request_parses_reserved_type_field() {
        let req: VerifyEmailRequest = serde_json::from_value(serde_json::json!({
            "type": "EMAIL",
            "token": "abc",
        }))
        .unwrap();

        assert_eq!(req.token_type, "EMAIL");
    }

    /// State over a lazy pool; only handler paths that fail before any store
    /// access can be exercised with it.
    fn app_state() -> AppState {
        let config = crate::config::Config {
            database_url: "postgresql://localhost/test".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            access_token_secret: "test-access-secret-at-least-32-chars".to_string(),
            refresh_token_secret: "test-refresh-secret-at-least-32-char".to_string(),
            session_secret: "test-session-secret".to_string(),
            mail_api_key: String::new(),
            mail_from: "test@example.com".to_string(),
            human_verification_secret: String::new(),
            human_verification_url: "https://example.invalid/verify".to_string(),
            mobile_user_agent: "SteppingStonesApp".to_string(),
            cookie_secure: true,
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        AppState::new(pool, config).unwrap()
    }

    #[tokio::test]
    async fn register_rejects_unaccepted_terms_before_any_io() {
        let req = RegisterRequest {
            name: "Jane".to_string(),
            email: "jane@test.com".to_string(),
            accept_terms_and_conditions: false,
            password: None,
        };

        match register(State(app_state()), Json(req)).await {
            Err(ApiError::BadRequest(message)) => {
                assert_eq!(message, "You must accept the terms and conditions");
            }
            Err(other) => panic!("unexpected error kind: {other}"),
            Ok(_) => panic!("registration without accepted terms must fail"),
        }
    }

    #[tokio::test]
    async fn register_rejects_invalid_email_before_any_io() {
        let req = RegisterRequest {
            name: "Jane".to_string(),
            email: "not-an-address".to_string(),
            accept_terms_and_conditions: true,
            password: None,
        };

        match register(State(app_state()), Json(req)).await {
            Err(ApiError::BadRequest(message)) => {
                assert_eq!(message, "Invalid email address");
            }
            Err(other) => panic!("unexpected error kind: {other}"),
            Ok(_) => panic!("registration with a malformed email must fail"),
        }
    }
}
