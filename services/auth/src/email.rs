//! Email delivery collaborator used by the job worker
//!
//! `LogEmailSender` logs instead of sending and is the default when no
//! provider is configured. `ResendEmailSender` posts to the Resend HTTP API.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Magic link email contents
#[derive(Debug, Clone, PartialEq)]
pub struct MagicLinkEmail {
    pub to_email: String,
    pub to_name: String,
    pub magic_link_url: String,
    /// Sign-in copy rather than verify-email copy
    pub is_login: bool,
}

impl MagicLinkEmail {
    pub fn subject(&self) -> &'static str {
        if self.is_login {
            "Sign in to Circa"
        } else {
            "Verify your email for Circa"
        }
    }

    pub fn text_body(&self) -> String {
        let action = if self.is_login {
            "Click the link below to sign in to Circa."
        } else {
            "Click the link below to verify your email and finish creating your Circa account."
        };
        format!(
            "Hi {},\n\n{}\n\n{}\n\nThis link works once and expires soon. If you did not request it, you can ignore this email.\n",
            self.to_name, action, self.magic_link_url
        )
    }
}

/// Email delivery abstraction
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a magic link email or return an error so the job can be retried
    async fn send_magic_link(&self, email: &MagicLinkEmail) -> Result<()>;
}

/// Development sender that logs the message instead of delivering it
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_magic_link(&self, email: &MagicLinkEmail) -> Result<()> {
        info!(
            to_email = %email.to_email,
            is_login = email.is_login,
            "Email delivery not configured, skipping magic link email"
        );
        Ok(())
    }
}

/// Email provider configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from: String,
}

impl EmailConfig {
    /// Create a new EmailConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RESEND_API_KEY`: Resend API key. When unset, no provider is configured.
    /// - `EMAIL_FROM`: Sender address (default: "Circa <noreply@circa.app>")
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("RESEND_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        let from = std::env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "Circa <noreply@circa.app>".to_string());
        Some(Self { api_key, from })
    }
}

/// Sender backed by the Resend HTTP API
#[derive(Clone)]
pub struct ResendEmailSender {
    client: reqwest::Client,
    config: EmailConfig,
}

impl ResendEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send_magic_link(&self, email: &MagicLinkEmail) -> Result<()> {
        let body = json!({
            "from": self.config.from,
            "to": [email.to_email],
            "subject": email.subject(),
            "text": email.text_body(),
        });

        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            info!(to_email = %email.to_email, "Magic link email sent");
            Ok(())
        } else {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!("Email provider rejected message: {} {}", status, detail);
            Err(anyhow!("email provider returned {}", status))
        }
    }
}
