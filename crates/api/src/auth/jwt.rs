//! Token issuance and verification
//!
//! Stateless signing and verification of the three token classes: short- to
//! medium-lived access tokens, long-lived refresh tokens, and email
//! verification tokens. Access and refresh tokens are signed with different
//! secrets so one leaked key cannot mint the other class. Signing is
//! CPU-bound; nothing here touches the store.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Access-token lifetime for web clients.
pub const ACCESS_TTL_WEB: Duration = Duration::days(1);
/// Access-token lifetime for mobile clients ("remember me").
pub const ACCESS_TTL_MOBILE: Duration = Duration::days(30);
/// Medium tier used by password-reset style flows.
pub const ACCESS_TTL_MEDIUM: Duration = Duration::hours(12);
/// Short tier for freshly refreshed web sessions.
pub const ACCESS_TTL_SHORT: Duration = Duration::hours(1);
/// Refresh tokens are invalidated server-side in the common path; the signed
/// expiry is a backstop, not the primary lifecycle control.
pub const REFRESH_TTL: Duration = Duration::days(30);
/// Email verification tokens.
pub const VERIFICATION_TTL: Duration = Duration::hours(24);

/// Clock skew tolerated during verification.
const LEEWAY_SECONDS: u64 = 60;

/// Which client is talking to us. Decides token TTL, cookie-vs-body token
/// delivery, and whether the human-verification challenge applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Web,
    Mobile,
}

impl ClientKind {
    /// Classify a request by its User-Agent against the configured mobile
    /// client marker. Anything else is treated as web.
    pub fn from_user_agent(user_agent: Option<&str>, mobile_marker: &str) -> Self {
        match user_agent {
            Some(ua) if !mobile_marker.is_empty() && ua.contains(mobile_marker) => Self::Mobile,
            _ => Self::Web,
        }
    }

    pub fn access_ttl(self) -> Duration {
        match self {
            Self::Web => ACCESS_TTL_WEB,
            Self::Mobile => ACCESS_TTL_MOBILE,
        }
    }

    pub fn is_mobile(self) -> bool {
        matches!(self, Self::Mobile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    Verification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// Access/verification verification failure. Callers must not learn
    /// whether the token was expired or malformed.
    #[error("Invalid or expired token")]
    Invalid,
    /// Refresh token with a valid signature past its expiry. Triggers
    /// server-side cleanup of the stored row.
    #[error("Refresh token expired")]
    Expired,
    /// Refresh token that fails signature or shape checks. Cannot be
    /// attributed to a stored row, so nothing is cleaned up.
    #[error("Malformed refresh token")]
    Malformed,
    #[error("Token signing failed")]
    Signing,
}

/// Stateless issuer/verifier for all token classes.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }

    fn sign(
        &self,
        user_id: Uuid,
        ttl: Duration,
        token_type: TokenType,
        key: &EncodingKey,
    ) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            token_type,
        };
        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|e| {
            tracing::error!(error = ?e, "Token signing failed");
            TokenError::Signing
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;
        validation
    }

    /// Mint an access token with the given lifetime.
    pub fn issue_access_token(&self, user_id: Uuid, ttl: Duration) -> Result<String, TokenError> {
        self.sign(user_id, ttl, TokenType::Access, &self.access_encoding)
    }

    /// Verify an access token. Any failure (bad signature, malformed,
    /// expired, wrong class) collapses to [`TokenError::Invalid`].
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.access_decoding, &Self::validation())
            .map_err(|_| TokenError::Invalid)?;
        if data.claims.token_type != TokenType::Access {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }

    /// Mint a refresh token, signed with the refresh secret.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign(user_id, REFRESH_TTL, TokenType::Refresh, &self.refresh_encoding)
    }

    /// Verify a refresh token, distinguishing expiry (stored row should be
    /// cleaned up) from malformation (nothing attributable to clean up).
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.refresh_decoding, &Self::validation()).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            },
        )?;
        if data.claims.token_type != TokenType::Refresh {
            return Err(TokenError::Malformed);
        }
        Ok(data.claims)
    }

    /// Mint a signed email-verification token (access secret, 24h).
    pub fn issue_verification_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign(
            user_id,
            VERIFICATION_TTL,
            TokenType::Verification,
            &self.access_encoding,
        )
    }

    /// Verify an email-verification token; failures collapse to a single
    /// kind, as for access tokens.
    pub fn verify_verification_token(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.access_decoding, &Self::validation())
            .map_err(|_| TokenError::Invalid)?;
        if data.claims.token_type != TokenType::Verification {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}
