//! Outbound mail
//!
//! Thin client for a Resend-style HTTP mail API. No retry guarantees: a send
//! either succeeds or surfaces as an internal error to the caller. With no
//! API key configured the mailer is disabled and messages are dropped with a
//! warning, which keeps local development working without a mail account.

use serde_json::json;

const SEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail send failed")]
    Send,
}

#[derive(Clone)]
pub struct Mailer {
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl Mailer {
    pub fn new(api_key: String, from: String, client: reqwest::Client) -> Self {
        Self {
            api_key,
            from,
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Send one HTML mail. Disabled mailer drops the message.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        if !self.is_enabled() {
            tracing::warn!(to = %to, subject = %subject, "Mail disabled, dropping message");
            return Ok(());
        }

        let response = self
            .client
            .post(SEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Mail request failed");
                MailError::Send
            })?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "Mail provider rejected message");
            return Err(MailError::Send);
        }

        tracing::info!(to = %to, subject = %subject, "Mail sent");
        Ok(())
    }
}

/// Subject and body for a one-time login code.
pub fn login_code_message(code: &str) -> (String, String) {
    (
        "Your Stepping Stones login code".to_string(),
        format!(
            "<p>Your login code is <strong>{code}</strong>.</p>\
             <p>It expires in 10 minutes. If you did not request it, you can ignore this mail.</p>"
        ),
    )
}

/// Subject and body for an email-verification link token.
pub fn verification_message(token: &str) -> (String, String) {
    (
        "Verify your Stepping Stones email address".to_string(),
        format!(
            "<p>Welcome to Stepping Stones!</p>\
             <p>Confirm your email address with this token: <code>{token}</code></p>"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailer_without_key_is_disabled() {
        let mailer = Mailer::new(
            String::new(),
            "test@example.com".to_string(),
            reqwest::Client::new(),
        );
        assert!(!mailer.is_enabled());
    }

    #[tokio::test]
    async fn disabled_mailer_drops_without_error() {
        let mailer = Mailer::new(
            String::new(),
            "test@example.com".to_string(),
            reqwest::Client::new(),
        );
        assert!(mailer.send("to@example.com", "s", "<p>x</p>").await.is_ok());
    }

    #[test]
    fn login_code_message_contains_code() {
        let (subject, html) = login_code_message("123456");
        assert!(subject.contains("login code"));
        assert!(html.contains("123456"));
    }
}
