//! Application state

use reqwest::Client;
use sqlx::PgPool;

use stepstone_shared::RateLimiter;

use crate::auth::{AuthState, SessionManager, TokenIssuer};
use crate::config::Config;
use crate::email::Mailer;
use crate::human_verification::HumanVerifier;

/// Shared application state. Built once in `main` and cloned per handler;
/// the pool is the only process-wide store handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub issuer: TokenIssuer,
    pub sessions: SessionManager,
    pub mailer: Mailer,
    pub human_verifier: HumanVerifier,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let issuer = TokenIssuer::new(&config.access_token_secret, &config.refresh_token_secret);
        let sessions = SessionManager::new(&config.session_secret)?;

        // One HTTP client for all outbound calls (mail, human verification).
        let http_client = Client::new();

        let mailer = Mailer::new(
            config.mail_api_key.clone(),
            config.mail_from.clone(),
            http_client.clone(),
        );
        if mailer.is_enabled() {
            tracing::info!("Outbound mail enabled");
        } else {
            tracing::warn!("Outbound mail not configured (missing RESEND_API_KEY)");
        }

        let human_verifier = HumanVerifier::new(
            config.human_verification_secret.clone(),
            config.human_verification_url.clone(),
            http_client,
        );
        if human_verifier.is_enabled() {
            tracing::info!("Human verification enabled");
        } else {
            tracing::warn!("Human verification not configured (missing TURNSTILE_SECRET)");
        }

        let rate_limiter = RateLimiter::new_in_memory();
        tracing::info!("Rate limiter initialized");

        Ok(Self {
            pool,
            config,
            issuer,
            sessions,
            mailer,
            human_verifier,
            rate_limiter,
        })
    }

    /// Get auth state for middleware.
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            issuer: self.issuer.clone(),
            sessions: self.sessions.clone(),
            pool: self.pool.clone(),
            mobile_user_agent: self.config.mobile_user_agent.clone(),
        }
    }
}
