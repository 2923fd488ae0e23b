//! Email drafting and sending
//!
//! `save_email_details` pulls recipients, subject and body out of the user's
//! own words with regexes and stores them as the pending email draft;
//! `send_email` delivers that draft and copies the admin.

use crate::drafts::{DraftStore, EmailDraft};
use crate::mail::templates::{render_admin_text, render_user_text};
use crate::mail::OutgoingEmail;
use crate::tools::{Tool, ToolContext, ToolDescription, ToolError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{error, info, warn};

pub const DEFAULT_BODY: &str = "Hello!";

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("valid email pattern"));

static BODY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)'(.*?)'|"(.*?)"|saying\s(.+)|message\s*:\s*(.+)"#)
        .expect("valid body pattern")
});

static SUBJECT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\bwith\s+subject\s+(?:'([^']*)'|"([^"]*)")|\bsubject\s*:\s*(?:'([^']*)'|"([^"]*)"|([^,;\n'"]+))"#,
    )
    .expect("valid subject pattern")
});

/// Every address in order of first appearance, without repeats
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut emails: Vec<String> = Vec::new();
    for found in EMAIL_PATTERN.find_iter(text) {
        let email = found.as_str().to_string();
        if !emails.contains(&email) {
            emails.push(email);
        }
    }
    emails
}

/// First quoted text, text after "saying", or text after "message:"
pub fn extract_body(text: &str) -> Option<String> {
    let captures = BODY_PATTERN.captures(text)?;
    captures
        .iter()
        .skip(1)
        .flatten()
        .map(|group| strip_quotes(group.as_str().trim()))
        .find(|group| !group.is_empty())
        .map(String::from)
}

/// `'text'` or `"text"` becomes `text`
fn strip_quotes(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[1..text.len() - 1].trim();
        }
    }
    text
}

/// An explicit subject and the text with the subject clause removed
///
/// Only `subject: ...` and `with subject '...'` count, and never when they
/// sit inside the message body itself.
pub fn extract_subject(text: &str) -> (Option<String>, String) {
    let body = BODY_PATTERN.find(text).map(|m| m.range());
    let clause = SUBJECT_PATTERN.captures_iter(text).find(|captures| {
        captures.get(0).is_some_and(|whole| {
            body.as_ref()
                .map_or(true, |body| !body.contains(&whole.start()))
        })
    });

    let Some(captures) = clause else {
        return (None, text.to_string());
    };
    let Some(whole) = captures.get(0) else {
        return (None, text.to_string());
    };

    let subject = captures
        .iter()
        .skip(1)
        .flatten()
        .map(|group| group.as_str().trim())
        .find(|group| !group.is_empty())
        .map(String::from);

    let mut remainder = String::with_capacity(text.len());
    remainder.push_str(&text[..whole.start()]);
    remainder.push_str(&text[whole.end()..]);

    (subject, remainder)
}

/// Draft from free text, `None` when it names no recipient
pub fn draft_from_text(text: &str, default_subject: &str) -> Option<EmailDraft> {
    let to_emails = extract_emails(text);
    if to_emails.is_empty() {
        return None;
    }

    let (subject, remainder) = extract_subject(text);
    let body = extract_body(&remainder).unwrap_or_else(|| DEFAULT_BODY.to_string());

    Some(EmailDraft {
        to_emails,
        subject: subject.unwrap_or_else(|| default_subject.to_string()),
        body,
    })
}

/// `save_email_details`
pub struct SaveEmailDetailsTool {
    drafts: DraftStore,
    default_subject: String,
}

impl SaveEmailDetailsTool {
    pub fn new(drafts: DraftStore, default_subject: String) -> Self {
        Self {
            drafts,
            default_subject,
        }
    }
}

#[async_trait]
impl Tool for SaveEmailDetailsTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "save_email_details".to_string(),
            description: "Extract and save email details from the user's request. Use this \
                          tool FIRST when the user asks to send an email, passing the ENTIRE \
                          user request text, e.g. \"send an email to someone@example.com \
                          saying 'Hello from Friday'\"."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "The user's full request"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(subject) = config
            .and_then(|c| c.get("default_subject"))
            .and_then(|s| s.as_str())
        {
            self.default_subject = subject.to_string();
        }
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let text = parameters["text"].as_str().unwrap_or_default();

        let draft = draft_from_text(text, &self.default_subject).ok_or_else(|| {
            ToolError::ExecutionError("No valid email found in message.".to_string())
        })?;

        let recipients = draft.to_emails.join(", ");
        info!(recipients = %recipients, subject = %draft.subject, "Email draft saved");
        self.drafts.save_email(draft).await;

        Ok(Value::String(format!("Emails saved for: {recipients}")))
    }
}

/// `send_email`
pub struct SendEmailTool {
    context: ToolContext,
}

impl SendEmailTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    /// One message per recipient, then the admin copy (pure function)
    fn build_messages(
        draft: &EmailDraft,
        admin_email: Option<&str>,
        assistant_name: &str,
    ) -> Vec<OutgoingEmail> {
        let user_html = render_user_text(&draft.body, assistant_name);
        let mut messages: Vec<OutgoingEmail> = draft
            .to_emails
            .iter()
            .map(|to| OutgoingEmail::html(to, &draft.subject, &user_html))
            .collect();

        if let Some(admin) = admin_email {
            messages.push(OutgoingEmail::html(
                admin,
                format!("Email Sent To {}", draft.to_emails.join(", ")),
                render_admin_text(&draft.to_emails, &draft.subject, &draft.body),
            ));
        }

        messages
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "send_email".to_string(),
            description: "Send the MOST RECENT saved email to its recipients and notify the \
                          admin. Use ONLY AFTER save_email_details has run."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "trigger": {
                        "type": "string",
                        "description": "Ignored"
                    }
                }
            }),
        }
    }

    async fn initialize(&mut self, _config: Option<&Value>) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(&self, _parameters: &Value) -> Result<Value, ToolError> {
        let draft = self.context.drafts.email().await.ok_or_else(|| {
            ToolError::ExecutionError("No emails saved. Run save_email_details first.".to_string())
        })?;

        let settings = &self.context.mail;
        if settings.admin_email.is_none() {
            warn!("No admin email configured, skipping admin notification");
        }

        let messages = Self::build_messages(
            &draft,
            settings.admin_email.as_deref(),
            &settings.assistant_name,
        );

        if let Err(e) = self.context.mailer.send_all(&messages).await {
            error!(error = %e, "Failed to send email");
            return Err(ToolError::ExecutionError(format!("Failed to send email: {e}")));
        }

        self.context.drafts.clear_email().await;

        let recipients = draft.to_emails.join(", ");
        info!(recipients = %recipients, "Email sent");
        let result = if settings.admin_email.is_some() {
            format!("Email sent to {recipients} and admin notified.")
        } else {
            format!("Email sent to {recipients}.")
        };
        Ok(Value::String(result))
    }
}
