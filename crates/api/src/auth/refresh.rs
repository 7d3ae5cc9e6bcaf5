//! Refresh token persistence and exchange
//!
//! One refresh token per user, replaced wholesale at login. The exchange
//! verifies the presented token against the refresh signing secret, then
//! against the stored row, and mints a fresh short-lived access token. The
//! refresh token itself is NOT rotated on exchange; it lives until logout or
//! expiry. Expired-but-valid tokens trigger deletion of the stored row so
//! stale rows do not accumulate.

use sqlx::{PgPool, Postgres, Transaction};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::jwt::{TokenError, TokenIssuer, ACCESS_TTL_SHORT};
use crate::models::find_user_by_id;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// No token was presented at all.
    #[error("No refresh token provided")]
    Missing,
    /// Correctly signed but past expiry; the stored row has been removed.
    #[error("Refresh token expired")]
    Expired,
    /// Bad signature, unknown user, or stored-value mismatch. Nothing is
    /// cleaned up because the token cannot be attributed to a row.
    #[error("Invalid refresh token")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Persist `token` as the user's single refresh token, replacing any prior.
pub async fn save_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET token = $2, created_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(token)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a refresh token row by its stored value. Returns the number of
/// rows removed (0 or 1).
pub async fn delete_refresh_token_by_value(
    pool: &PgPool,
    token: &str,
) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(deleted)
}

/// Exchange a presented refresh token for a new short-lived access token.
pub async fn exchange(
    pool: &PgPool,
    issuer: &TokenIssuer,
    presented: &str,
) -> Result<String, RefreshError> {
    let claims = match issuer.verify_refresh_token(presented) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            // Cleanup-on-failure: the signature proved the token was ours.
            let deleted = delete_refresh_token_by_value(pool, presented).await?;
            tracing::info!(deleted, "Expired refresh token presented, stored row removed");
            return Err(RefreshError::Expired);
        }
        Err(_) => return Err(RefreshError::Forbidden),
    };

    let user = find_user_by_id(pool, claims.sub)
        .await?
        .ok_or(RefreshError::Forbidden)?;

    let stored: Option<(String,)> =
        sqlx::query_as("SELECT token FROM refresh_tokens WHERE user_id = $1")
            .bind(user.id)
            .fetch_optional(pool)
            .await?;

    let Some((stored,)) = stored else {
        return Err(RefreshError::Forbidden);
    };

    // Constant-time comparison of the presented and stored token strings.
    let matches: bool = stored.as_bytes().ct_eq(presented.as_bytes()).into();
    if !matches {
        tracing::warn!(user_id = %user.id, "Refresh token does not match stored value");
        return Err(RefreshError::Forbidden);
    }

    issuer
        .issue_access_token(user.id, ACCESS_TTL_SHORT)
        .map_err(|_| RefreshError::Forbidden)
}

/// Mark a mobile client as online. Upsert keeps one presence row per user.
pub async fn mark_online(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO online_users (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO UPDATE SET connected_at = NOW()
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mobile logout: remove the refresh token row and the presence record in
/// one transaction. Either both rows go or neither does.
pub async fn mobile_logout(pool: &PgPool, token: &str) -> Result<bool, sqlx::Error> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    let owner: Option<(Uuid,)> =
        sqlx::query_as("SELECT user_id FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;

    let Some((user_id,)) = owner else {
        tx.rollback().await?;
        return Ok(false);
    };

    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM online_users WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Mobile logout complete");
    Ok(true)
}
