//! Authentication middleware for Axum
//!
//! Two strategies populate the same request-scoped [`AuthUser`] context,
//! tried in fixed order: a Bearer access token, then the signed session
//! cookie. Authorization gates (`require_auth`, `require_admin`,
//! `require_role`) are pure predicates over that context and do not care
//! which strategy matched. Guarded routes always answer 401 when no strategy
//! matches; there is no silent fall-through.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE, USER_AGENT};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{ClientKind, TokenIssuer};
use super::session::{find_live_session_user, SessionManager};
use crate::error::ApiError;
use crate::models::{find_user_by_id, User};

/// Cookie carrying the refresh token (web clients only).
pub const REFRESH_COOKIE: &str = "ss_refresh_token";
/// Cookie carrying the signed session id.
pub const SESSION_COOKIE: &str = "ss_session";

/// Which strategy authenticated this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    CookieSession,
}

/// The authenticated principal for one request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub auth_method: AuthMethod,
}

impl AuthUser {
    fn from_user(user: &User, auth_method: AuthMethod) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            is_admin: user.is_admin,
            is_super_admin: user.is_super_admin,
            auth_method,
        }
    }

    pub fn has_role_in(&self, roles: &[&str]) -> bool {
        roles.contains(&self.role.as_str())
    }
}

/// State needed for authentication.
#[derive(Clone)]
pub struct AuthState {
    pub issuer: TokenIssuer,
    pub sessions: SessionManager,
    pub pool: PgPool,
    pub mobile_user_agent: String,
}

impl AuthState {
    /// Classify the calling client by User-Agent marker.
    pub fn client_kind(&self, request: &Request) -> ClientKind {
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok());
        ClientKind::from_user_agent(user_agent, &self.mobile_user_agent)
    }
}

/// Extract a bearer token from the Authorization header.
pub(crate) fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Extract a named cookie from the Cookie header.
pub(crate) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    for cookie in cookies.split(';') {
        let cookie = cookie.trim();
        if let Some(rest) = cookie.strip_prefix(name) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}

async fn authenticate_bearer(state: &AuthState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = state
        .issuer
        .verify_access_token(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    // Every check re-reads from source; no in-process user caching.
    let user = find_user_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    Ok(AuthUser::from_user(&user, AuthMethod::Bearer))
}

async fn authenticate_session_cookie(
    state: &AuthState,
    cookie: &str,
) -> Result<AuthUser, ApiError> {
    let session_id = state
        .sessions
        .parse_cookie(cookie)
        .ok_or_else(|| ApiError::Unauthorized("Invalid session".to_string()))?;

    let user_id = find_live_session_user(&state.pool, session_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid session".to_string()))?;

    let user = find_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid session".to_string()))?;

    Ok(AuthUser::from_user(&user, AuthMethod::CookieSession))
}

/// Run the strategies in fixed order: Bearer first, session cookie second.
/// Takes the already-extracted credentials so the future does not borrow the
/// request body, which is not `Sync`.
async fn authenticate(
    state: &AuthState,
    bearer: Option<String>,
    session_cookie: Option<String>,
) -> Result<AuthUser, ApiError> {
    if let Some(token) = bearer {
        return authenticate_bearer(state, &token).await;
    }
    if let Some(cookie) = session_cookie {
        return authenticate_session_cookie(state, &cookie).await;
    }
    Err(ApiError::Unauthorized("Authentication required".to_string()))
}

fn credentials(request: &Request) -> (Option<String>, Option<String>) {
    (
        extract_bearer_token(request),
        extract_cookie(request.headers(), SESSION_COOKIE),
    )
}

/// Middleware that requires authentication.
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (bearer, cookie) = credentials(&request);
    match authenticate(&auth_state, bearer, cookie).await {
        Ok(auth_user) => {
            tracing::debug!(
                user_id = %auth_user.user_id,
                auth_method = ?auth_user.auth_method,
                "Request authenticated"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %request.uri().path(), error = %err, "Authentication failed");
            err.into_response()
        }
    }
}

/// Middleware that optionally authenticates; unauthenticated requests pass
/// through without a context.
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (bearer, cookie) = credentials(&request);
    if let Ok(auth_user) = authenticate(&auth_state, bearer, cookie).await {
        request.extensions_mut().insert(auth_user);
    }
    next.run(request).await
}

/// Middleware that requires an authenticated admin.
pub async fn require_admin(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (bearer, cookie) = credentials(&request);
    match authenticate(&auth_state, bearer, cookie).await {
        Ok(auth_user) if auth_user.is_admin => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Ok(auth_user) => {
            tracing::warn!(user_id = %auth_user.user_id, "Admin gate rejected non-admin");
            ApiError::Forbidden("Admin access required".to_string()).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Middleware that requires one of the given roles.
pub async fn require_role(
    required_roles: &'static [&'static str],
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (bearer, cookie) = credentials(&request);
    match authenticate(&auth_state, bearer, cookie).await {
        Ok(auth_user) if auth_user.has_role_in(required_roles) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Ok(auth_user) => {
            tracing::warn!(
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "Role gate rejected user"
            );
            ApiError::Forbidden("Insufficient permissions".to_string()).into_response()
        }
        Err(err) => err.into_response(),
    }
}
