//! Outbound mail for one-time codes
//!
//! Sends through the Resend HTTP API when `RESEND_API_KEY` is configured,
//! otherwise records the message in the log only.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::auth::otp::{EMAIL_OTP_MAX_AGE_MINUTES, PASSWORD_RESET_OTP_MAX_AGE_MINUTES};

const RESEND_API_URL: &str = "https://api.resend.com";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Mail sender collaborator. Failures are not retried.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError>;
}

/// Resend (https://resend.com) mail sender
#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
    base_url: String,
}

impl ResendMailer {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            from: from.into(),
            base_url: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "Mail accepted by provider");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!(status = status.as_u16(), body = %body, "Mail provider rejected message");
        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Logs instead of sending; for development without a mail provider
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), MailError> {
        tracing::warn!(to = %to, subject = %subject, "Mail not sent (missing RESEND_API_KEY)");
        Ok(())
    }
}

pub struct MailMessage {
    pub subject: String,
    pub html: String,
}

pub fn verification_email(app_name: &str, user_name: &str, code: &str) -> MailMessage {
    MailMessage {
        subject: format!("{app_name} - Verify your email"),
        html: format!(
            "Hi {}! welcome onboard here is your email verification code that is valid \
             for {EMAIL_OTP_MAX_AGE_MINUTES} minutes: <h1>{code}</h1>",
            escape_html(user_name)
        ),
    }
}

pub fn password_reset_email(app_name: &str, user_name: &str, code: &str) -> MailMessage {
    MailMessage {
        subject: format!("{app_name} - Reset your password"),
        html: format!(
            "Hi {}! here is your password reset code that is valid \
             for {PASSWORD_RESET_OTP_MAX_AGE_MINUTES} minutes: <h1>{code}</h1>",
            escape_html(user_name)
        ),
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#x27;y&#x27;"
        );
        assert_eq!(escape_html("Awais"), "Awais");
    }

    #[test]
    fn test_verification_email_escapes_name() {
        let mail = verification_email("EventHub", "<b>Eve</b>", "012345");
        assert_eq!(mail.subject, "EventHub - Verify your email");
        assert!(mail.html.starts_with("Hi &lt;b&gt;Eve&lt;/b&gt;!"));
        assert!(mail.html.contains("valid for 15 minutes"));
        assert!(mail.html.ends_with("<h1>012345</h1>"));
    }

    #[test]
    fn test_password_reset_email() {
        let mail = password_reset_email("EventHub", "Awais", "999999");
        assert!(mail.subject.contains("Reset"));
        assert!(mail.html.contains("<h1>999999</h1>"));
    }

    #[tokio::test]
    async fn test_resend_mailer_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test_key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "from": "EventHub <noreply@example.com>",
                "to": ["awais@example.com"],
                "subject": "Hello",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"4ef9a417"}"#)
            .create_async()
            .await;

        let mailer = ResendMailer::new("re_test_key", "EventHub <noreply@example.com>")
            .with_base_url(server.url());
        mailer
            .send("awais@example.com", "Hello", "<h1>123456</h1>")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resend_mailer_surfaces_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body(r#"{"message":"Invalid `to` field"}"#)
            .create_async()
            .await;

        let mailer = ResendMailer::new("re_test_key", "noreply@example.com")
            .with_base_url(server.url());
        let err = mailer.send("bad", "Hello", "body").await.unwrap_err();
        assert!(matches!(err, MailError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        assert!(LogMailer.send("a@example.com", "s", "b").await.is_ok());
    }
}
