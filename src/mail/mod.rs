//! Outbound mail: the `Mailer` seam, an SMTP implementation, a log-only
//! fallback, message templates and the admin send endpoint.

pub mod handlers;
pub mod smtp;
pub mod templates;

use std::sync::Arc;

use axum::{async_trait, routing::post, Router};
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;

pub use smtp::SmtpMailer;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Email {
    pub subject: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub body: String,
    #[serde(default)]
    pub html: Option<String>,
}

impl Email {
    /// To, Cc and Bcc together.
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("at least one recipient is required")]
    NoRecipients,
    #[error("invalid address `{0}`")]
    Address(String),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Used when no SMTP host is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        if email.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        info!(
            subject = %email.subject,
            recipients = ?email.envelope_recipients(),
            "smtp not configured; mail logged only"
        );
        Ok(())
    }
}

/// Sends in the background. Failures are logged and never reach the caller.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        let subject = email.subject.clone();
        let to = email.to.clone();
        if let Err(e) = mailer.send(email).await {
            warn!(error = %e, %subject, ?to, "notification mail failed");
        }
    });
}

pub fn router() -> Router<AppState> {
    Router::new().route("/mail/send", post(handlers::send_mail))
}
