//! Mailer — invitation delivery through an HTTP mail-delivery API.
//!
//! `AppState` holds an `Arc<dyn MailSender>` so dispatch logic can be tested
//! against a recording fake without a live provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// The mail-sender trait. One call per recipient; failures are reported per
/// attempt so bulk dispatch can collect them without aborting.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Mail sender backed by a JSON mail-delivery API (bearer-key auth).
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Result<Self, MailError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl MailSender for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&MailRequest {
                from: &self.from,
                to,
                subject,
                html: html_body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Invitation email delivered to {to}");
        Ok(())
    }
}

/// Builds the invitation email sent to eligible candidates.
/// Returns `(subject, html_body)`.
pub fn invitation_email(registration_base_url: &str, email: &str) -> (String, String) {
    let registration_link = format!(
        "{}/register?email={}",
        registration_base_url.trim_end_matches('/'),
        urlencoding::encode(email)
    );

    let subject = "Internship Registration Link".to_string();
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; line-height: 1.5;">
  <h2 style="color: #2c3e50;">Hello,</h2>
  <p>You have been found eligible for the internship!</p>
  <p>Click the link below to register:</p>
  <p>
    <a href="{registration_link}"
       style="background-color:#007bff;color:#fff;padding:10px 20px;text-decoration:none;border-radius:6px;display:inline-block;">
       Register Now
    </a>
  </p>
</div>"#
    );

    (subject, html)
}
