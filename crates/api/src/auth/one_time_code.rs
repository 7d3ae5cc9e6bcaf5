//! One-time login codes
//!
//! Issues a 6-digit numeric code per login request and later exchanges a
//! valid, unexpired, matching code for the owning user. Issuing always
//! deletes the user's prior tokens first, so at most one live code exists
//! per user; the delete and insert are sequential single-row writes, and two
//! concurrent login requests for the same user resolve last-writer-wins.

use rand::Rng;
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::{find_user_by_id, User};

/// Codes expire ten minutes after issuance, checked lazily at exchange time.
pub const CODE_TTL: Duration = Duration::minutes(10);
pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

const TOKEN_TYPE_EMAIL: &str = "EMAIL";

#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    /// Unknown, consumed, invalidated, or wrong-email code. One kind for all
    /// of these so responses cannot be used for user enumeration.
    #[error("Invalid code")]
    InvalidCode,
    #[error("Code expired")]
    CodeExpired,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Uniform 6-digit code.
fn generate_code() -> String {
    rand::rng().random_range(CODE_MIN..=CODE_MAX).to_string()
}

#[derive(Debug, FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    valid: bool,
    expires_at: OffsetDateTime,
}

/// Issue a fresh login code for `user_id`, replacing any prior tokens.
/// Returns the code for out-of-band delivery.
pub async fn issue_code(pool: &PgPool, user_id: Uuid) -> Result<String, sqlx::Error> {
    sqlx::query("DELETE FROM login_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    let expires_at = OffsetDateTime::now_utc() + CODE_TTL;

    // `secret` is globally unique; a collision with another user's live code
    // is possible, so retry with a fresh code a couple of times.
    let mut last_err = None;
    for _ in 0..3 {
        let code = generate_code();
        let inserted = sqlx::query(
            r#"
            INSERT INTO login_tokens (user_id, secret, token_type, valid, expires_at)
            VALUES ($1, $2, $3, TRUE, $4)
            ON CONFLICT (secret) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&code)
        .bind(TOKEN_TYPE_EMAIL)
        .bind(expires_at)
        .execute(pool)
        .await;

        match inserted {
            Ok(result) if result.rows_affected() == 1 => {
                tracing::info!(user_id = %user_id, "One-time login code issued");
                return Ok(code);
            }
            Ok(_) => continue,
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or(sqlx::Error::RowNotFound))
}

/// Exchange `(email, code)` for the owning user, consuming the code.
///
/// The code must exist, be flagged valid, be unexpired, and belong to the
/// user with the supplied email; on success the row is deleted so a second
/// exchange with the same code fails.
pub async fn exchange_code(pool: &PgPool, email: &str, code: &str) -> Result<User, CodeError> {
    let row: Option<TokenRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, valid, expires_at
        FROM login_tokens
        WHERE secret = $1 AND token_type = $2
        "#,
    )
    .bind(code)
    .bind(TOKEN_TYPE_EMAIL)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(CodeError::InvalidCode);
    };
    if !row.valid {
        return Err(CodeError::InvalidCode);
    }
    if row.expires_at < OffsetDateTime::now_utc() {
        return Err(CodeError::CodeExpired);
    }

    let user = find_user_by_id(pool, row.user_id)
        .await?
        .ok_or(CodeError::InvalidCode)?;

    // Code/email binding, case-sensitive. A mismatch reads the same as an
    // unknown code from the outside.
    if user.email != email {
        return Err(CodeError::InvalidCode);
    }

    sqlx::query("DELETE FROM login_tokens WHERE id = $1")
        .bind(row.id)
        .execute(pool)
        .await?;

    tracing::info!(user_id = %user.id, "One-time login code consumed");
    Ok(user)
}

/// Persist a signed email-verification token, replacing prior tokens.
pub async fn store_verification_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM login_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO login_tokens (user_id, secret, token_type, valid, expires_at)
        VALUES ($1, $2, $3, TRUE, $4)
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(TOKEN_TYPE_EMAIL)
    .bind(OffsetDateTime::now_utc() + Duration::hours(24))
    .execute(pool)
    .await?;

    Ok(())
}

/// Consume a stored verification token for the expected user. Returns false
/// if no live matching row exists (already consumed, expired, or not theirs).
pub async fn consume_verification_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM login_tokens
        WHERE secret = $1 AND user_id = $2 AND valid = TRUE AND expires_at > NOW()
        "#,
    )
    .bind(token)
    .bind(user_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits_in_range() {
        for _ in 0..1_000 {
            let code = generate_code();
            assert_eq!(code.len(), 6, "code should always print as 6 digits");
            let value: u32 = code.parse().unwrap();
            assert!((CODE_MIN..=CODE_MAX).contains(&value));
        }
    }

    #[test]
    fn code_ttl_is_ten_minutes() {
        assert_eq!(CODE_TTL, Duration::minutes(10));
    }

    #[test]
    fn invalid_and_expired_are_distinct_kinds() {
        // Callers map these to the same HTTP status but different messages;
        // the email-mismatch case must NOT get its own kind.
        assert_ne!(
            CodeError::InvalidCode.to_string(),
            CodeError::CodeExpired.to_string()
        );
    }
}
