//! SMTP delivery through lettre

use crate::config::AssistantConfig;
use crate::mail::{EmailBody, MailError, Mailer, OutgoingEmail};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

/// Port that speaks TLS from the first byte instead of upgrading with STARTTLS
const IMPLICIT_TLS_PORT: u16 = 465;

/// Relay host and login, resolved from the environment
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SmtpSettings {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            host: config.smtp.host.clone(),
            port: config.smtp.port,
            username: config.get_smtp_username(),
            password: config.get_smtp_password(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Mailer that logs in to an SMTP relay; the login doubles as the From address
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn sender(&self) -> Result<(Mailbox, Credentials), MailError> {
        let (username, password) = match (&self.settings.username, &self.settings.password) {
            (Some(username), Some(password)) => (username, password),
            _ => {
                return Err(MailError::NotConfigured(
                    "SMTP sender address or app password is not set".to_string(),
                ))
            }
        };

        let from: Mailbox = username
            .parse()
            .map_err(|_| MailError::InvalidAddress(username.clone()))?;

        Ok((from, Credentials::new(username.clone(), password.clone())))
    }

    fn transport(
        &self,
        credentials: Credentials,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let builder = if self.settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.host)
        }
        .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(builder
            .port(self.settings.port)
            .credentials(credentials)
            .build())
    }
}

/// Build a lettre message (pure function)
fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, MailError> {
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

    let content_type = match email.body {
        EmailBody::Html(_) => ContentType::TEXT_HTML,
        EmailBody::Text(_) => ContentType::TEXT_PLAIN,
    };

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.as_str())
        .header(content_type)
        .body(email.body.as_str().to_string())
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_all(&self, emails: &[OutgoingEmail]) -> Result<(), MailError> {
        if emails.is_empty() {
            return Ok(());
        }

        let (from, credentials) = self.sender()?;

        // Build everything up front so a bad address sends nothing
        let messages = emails
            .iter()
            .map(|email| build_message(&from, email))
            .collect::<Result<Vec<_>, _>>()?;

        let transport = self.transport(credentials)?;

        for (email, message) in emails.iter().zip(messages) {
            transport
                .send(message)
                .await
                .map_err(|e| MailError::Transport(e.to_string()))?;
            debug!(to = %email.to, subject = %email.subject, "SMTP message accepted");
        }

        info!(
            host = %self.settings.host,
            count = emails.len(),
            "Sent email batch"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(username: Option<&str>, password: Option<&str>) -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: username.map(String::from),
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(settings(Some("bot@example.com"), Some("pw")).is_configured());
        assert!(!settings(Some("bot@example.com"), None).is_configured());
        assert!(!settings(None, Some("pw")).is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_refuses_to_send() {
        let mailer = SmtpMailer::new(settings(None, None));
        let result = mailer
            .send(OutgoingEmail::text("a@example.com", "Hi", "Hello"))
            .await;
        assert!(matches!(result, Err(MailError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let mailer = SmtpMailer::new(settings(None, None));
        assert!(mailer.send_all(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_recipient_rejected_before_connecting() {
        let mailer = SmtpMailer::new(settings(Some("bot@example.com"), Some("pw")));
        let result = mailer
            .send_all(&[
                OutgoingEmail::html("ok@example.com", "Hi", "<p>Hi</p>"),
                OutgoingEmail::html("not an address", "Hi", "<p>Hi</p>"),
            ])
            .await;
        assert!(matches!(result, Err(MailError::InvalidAddress(addr)) if addr == "not an address"));
    }

    #[test]
    fn test_build_message_sets_headers() {
        let from: Mailbox = "bot@example.com".parse().unwrap();
        let message = build_message(
            &from,
            &OutgoingEmail::html("a@example.com", "Status", "<b>done</b>"),
        )
        .unwrap();

        let rendered = String::from_utf8(message.formatted()).unwrap();
        assert!(rendered.contains("Subject: Status"));
        assert!(rendered.contains("To: a@example.com"));
        assert!(rendered.contains("text/html"));
    }
}
