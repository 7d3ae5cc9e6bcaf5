//! Environment-derived configuration
//!
//! All configuration is read once at startup. Missing signing secrets are a
//! fatal startup condition, never a per-request error.

use std::env;

/// Application configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Signing secret for access tokens.
    pub access_token_secret: String,
    /// Signing secret for refresh tokens. Deliberately distinct from the
    /// access secret so one leaked key cannot mint the other token class.
    pub refresh_token_secret: String,
    /// Secret used to sign session cookies.
    pub session_secret: String,
    /// Mail provider API key; empty disables outbound mail.
    pub mail_api_key: String,
    /// Sender address for one-time-code and verification mail.
    pub mail_from: String,
    /// Human-verification (CAPTCHA) shared secret; empty disables the check.
    pub human_verification_secret: String,
    /// Verification endpoint of the human-verification service.
    pub human_verification_url: String,
    /// User-Agent marker identifying the mobile client.
    pub mobile_user_agent: String,
    /// Whether auth cookies carry the `Secure` attribute. Disabled only for
    /// local development over plain HTTP.
    pub cookie_secure: bool,
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{name} must be set"))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            bind_address: optional("BIND_ADDRESS", "0.0.0.0:8080"),
            access_token_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?,
            session_secret: required("SESSION_SECRET")?,
            mail_api_key: optional("RESEND_API_KEY", ""),
            mail_from: optional("MAIL_FROM", "Stepping Stones <no-reply@steppingstones.app>"),
            human_verification_secret: optional("TURNSTILE_SECRET", ""),
            human_verification_url: optional(
                "TURNSTILE_URL",
                "https://challenges.cloudflare.com/turnstile/v0/siteverify",
            ),
            mobile_user_agent: optional("MOBILE_USER_AGENT", "SteppingStonesApp"),
            cookie_secure: optional("COOKIE_SECURE", "true") != "false",
        };

        if config.access_token_secret == config.refresh_token_secret {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_falls_back_to_default() {
        assert_eq!(
            optional("STEPSTONE_TEST_UNSET_VAR", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn required_reports_missing_variable() {
        let err = required("STEPSTONE_TEST_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("STEPSTONE_TEST_UNSET_VAR"));
    }
}
