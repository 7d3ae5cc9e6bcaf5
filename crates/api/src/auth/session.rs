//! Server-side sessions and post-authentication issuance
//!
//! A successful code exchange (or legacy password check) yields three
//! credentials: an access token whose TTL depends on the client kind, a
//! persisted refresh token replacing any prior one for the user, and a
//! server-side session row backing the cookie strategy. Session cookies
//! carry the session id plus an HMAC signature so a tampered cookie never
//! reaches the store.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::jwt::{ClientKind, TokenIssuer};
use super::refresh::{mark_online, save_refresh_token};
use crate::error::{ApiError, ApiResult};
use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

/// Server-side sessions match the refresh cookie max-age.
pub const SESSION_TTL: Duration = Duration::hours(24);

/// Signs and verifies session cookie values (`<uuid>.<hex hmac>`).
#[derive(Clone)]
pub struct SessionManager {
    mac: HmacSha256,
}

impl SessionManager {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid session secret: {e}"))?;
        Ok(Self { mac })
    }

    fn signature(&self, session_id: Uuid) -> String {
        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Cookie value for a session id.
    pub fn cookie_value(&self, session_id: Uuid) -> String {
        format!("{}.{}", session_id, self.signature(session_id))
    }

    /// Parse and verify a cookie value. Returns the session id only when the
    /// signature checks out; comparison is constant-time.
    pub fn parse_cookie(&self, value: &str) -> Option<Uuid> {
        let (id_part, sig) = value.split_once('.')?;
        let session_id = Uuid::parse_str(id_part).ok()?;
        let expected = self.signature(session_id);
        let valid: bool = expected.as_bytes().ct_eq(sig.as_bytes()).into();
        valid.then_some(session_id)
    }
}

/// Create a session row, returning its id.
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> Result<Uuid, sqlx::Error> {
    let session_id: Uuid = sqlx::query_scalar(
        "INSERT INTO sessions (user_id, expires_at) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(OffsetDateTime::now_utc() + SESSION_TTL)
    .fetch_one(pool)
    .await?;

    Ok(session_id)
}

/// Resolve a live (unexpired) session to its user id.
pub async fn find_live_session_user(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM sessions WHERE id = $1 AND expires_at > NOW()")
        .bind(session_id)
        .fetch_optional(pool)
        .await
}

pub async fn delete_session(pool: &PgPool, session_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Everything a freshly authenticated client receives.
#[derive(Debug)]
pub struct IssuedSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

/// Post-authentication issuance: access token (TTL by client kind), refresh
/// token persisted with replacement, session row, and mobile presence.
pub async fn issue_session(
    pool: &PgPool,
    issuer: &TokenIssuer,
    user: User,
    kind: ClientKind,
) -> ApiResult<IssuedSession> {
    let access_token = issuer
        .issue_access_token(user.id, kind.access_ttl())
        .map_err(|_| ApiError::Internal)?;
    let refresh_token = issuer
        .issue_refresh_token(user.id)
        .map_err(|_| ApiError::Internal)?;

    save_refresh_token(pool, user.id, &refresh_token).await?;
    let session_id = create_session(pool, user.id).await?;

    if kind.is_mobile() {
        mark_online(pool, user.id).await?;
    }

    tracing::info!(user_id = %user.id, client = ?kind, "Session issued");

    Ok(IssuedSession {
        user,
        access_token,
        refresh_token,
        session_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new("test-session-secret").unwrap()
    }

    #[test]
    fn cookie_round_trip() {
        let manager = manager();
        let session_id = Uuid::new_v4();

        let value = manager.cookie_value(session_id);
        assert_eq!(manager.parse_cookie(&value), Some(session_id));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let manager = manager();
        let value = manager.cookie_value(Uuid::new_v4());

        let mut tampered = value.clone();
        let last = if tampered.ends_with('0') { '1' } else { '0' };
        tampered.pop();
        tampered.push(last);

        assert_eq!(manager.parse_cookie(&tampered), None);
    }

    #[test]
    fn tampered_session_id_is_rejected() {
        let manager = manager();
        let value = manager.cookie_value(Uuid::new_v4());
        let sig = value.split_once('.').unwrap().1;

        let forged = format!("{}.{}", Uuid::new_v4(), sig);
        assert_eq!(manager.parse_cookie(&forged), None);
    }

    #[test]
    fn garbage_cookie_values_are_rejected() {
        let manager = manager();
        assert_eq!(manager.parse_cookie(""), None);
        assert_eq!(manager.parse_cookie("no-dot"), None);
        assert_eq!(manager.parse_cookie("not-a-uuid.abcdef"), None);
    }

    #[test]
    fn different_secrets_do_not_verify() {
        let a = manager();
        let b = SessionManager::new("another-session-secret").unwrap();

        let value = a.cookie_value(Uuid::new_v4());
        assert_eq!(b.parse_cookie(&value), None);
    }

    #[test]
    fn session_ttl_matches_refresh_cookie_max_age() {
        assert_eq!(SESSION_TTL, Duration::hours(24));
    }
}
