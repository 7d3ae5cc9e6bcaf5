//! Refresh-token exchange routes
//!
//! Web clients present the refresh token as a cookie; mobile clients send it
//! in the request body. Both paths run the same exchange and receive a fresh
//! short-lived access token. An expired token additionally clears the web
//! cookie so the browser stops retrying with it.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::middleware::extract_cookie;
use crate::auth::refresh::{self, RefreshError};
use crate::auth::REFRESH_COOKIE;
use crate::error::{ApiError, ApiResult};
use crate::routes::clear_cookie;
use crate::state::AppState;

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Missing => ApiError::Unauthorized(err.to_string()),
            RefreshError::Expired => ApiError::Unauthorized(err.to_string()),
            RefreshError::Forbidden => ApiError::Forbidden(err.to_string()),
            RefreshError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileRefreshRequest {
    pub refresh_token: String,
}

fn token_response(access_token: String) -> Json<Value> {
    Json(json!({
        "token": access_token,
        "success": true,
    }))
}

/// `GET|POST /refresh`. Cookie-based exchange for web clients.
pub async fn refresh_web(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(presented) = extract_cookie(&headers, REFRESH_COOKIE) else {
        return ApiError::from(RefreshError::Missing).into_response();
    };

    match refresh::exchange(&state.pool, &state.issuer, &presented).await {
        Ok(access_token) => token_response(access_token).into_response(),
        Err(RefreshError::Expired) => {
            // The stored row is already gone; also expire the cookie.
            let cleared = [(
                SET_COOKIE,
                clear_cookie(REFRESH_COOKIE, state.config.cookie_secure),
            )];
            (
                StatusCode::UNAUTHORIZED,
                cleared,
                Json(json!({
                    "message": RefreshError::Expired.to_string(),
                    "success": false,
                })),
            )
                .into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// `POST /refresh/mobile`. Body-based exchange for mobile clients.
pub async fn refresh_mobile(
    State(state): State<AppState>,
    Json(req): Json<MobileRefreshRequest>,
) -> ApiResult<Json<Value>> {
    if req.refresh_token.is_empty() {
        return Err(RefreshError::Missing.into());
    }

    let access_token = refresh::exchange(&state.pool, &state.issuer, &req.refresh_token).await?;
    Ok(token_response(access_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_errors_map_to_expected_statuses() {
        assert!(matches!(
            ApiError::from(RefreshError::Missing),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiError::from(RefreshError::Expired),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiError::from(RefreshError::Forbidden),
            ApiError::Forbidden(_)
        ));
    }

    #[test]
    fn mobile_request_parses_camel_case() {
        let req: MobileRefreshRequest = serde_json::from_value(serde_json::json!({
            "refreshToken": "abc",
        }))
        .unwrap();
        assert_eq!(req.refresh_token, "abc");
    }
}
