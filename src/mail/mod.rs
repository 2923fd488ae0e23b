//! Outgoing mail
//!
//! Tools and HTTP handlers build `OutgoingEmail` values and hand them to a
//! [`Mailer`]. The production mailer relays through SMTP with lettre; tests
//! use the recording mailer from `testing::mocks`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod smtp;
pub mod templates;

pub use smtp::{SmtpMailer, SmtpSettings};

/// Message body, sent as `text/html` or `text/plain`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum EmailBody {
    Html(String),
    Text(String),
}

impl EmailBody {
    pub fn as_str(&self) -> &str {
        match self {
            EmailBody::Html(content) | EmailBody::Text(content) => content,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, EmailBody::Html(_))
    }
}

/// A single message to a single recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: EmailBody,
}

impl OutgoingEmail {
    pub fn html(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: EmailBody::Html(body.into()),
        }
    }

    pub fn text(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: EmailBody::Text(body.into()),
        }
    }
}

/// Delivery backend
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send every message over one session, stopping at the first failure
    async fn send_all(&self, emails: &[OutgoingEmail]) -> Result<(), MailError>;

    /// Send a single message
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.send_all(std::slice::from_ref(&email)).await
    }
}

/// Mail delivery errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail not configured: {0}")]
    NotConfigured(String),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Failed to build message: {0}")]
    Build(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_body_accessors() {
        let html = OutgoingEmail::html("a@example.com", "Hi", "<p>Hi</p>");
        assert!(html.body.is_html());
        assert_eq!(html.body.as_str(), "<p>Hi</p>");

        let text = OutgoingEmail::text("a@example.com", "Hi", "plain");
        assert!(!text.body.is_html());
        assert_eq!(text.body.as_str(), "plain");
    }

    #[test]
    fn test_mail_error_display() {
        let error = MailError::InvalidAddress("not-an-address".to_string());
        assert_eq!(error.to_string(), "Invalid address 'not-an-address'");
    }
}
