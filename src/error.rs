//! Error types for the Friday assistant
//!
//! Every subsystem has its own error enum; `AssistantError` wraps them and
//! maps each to the HTTP status and sanitized message returned to clients.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid secret pattern")
});

static SECRET_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("valid path pattern")
});

const MAX_CLIENT_MESSAGE_LEN: usize = 500;

/// Main error type for assistant operations
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("LLM provider error: {message}")]
    LlmError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Tool loop exceeded maximum iterations ({max})")]
    IterationLimit { max: usize },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Tool error: {0}")]
    ToolError(#[from] crate::tools::ToolError),

    #[error("Mail error: {0}")]
    MailError(#[from] crate::mail::MailError),

    #[error("Calendar error: {0}")]
    CalendarError(#[from] crate::calendar::CalendarError),

    #[error("OAuth error: {0}")]
    OAuthError(#[from] crate::oauth::OAuthError),
}

impl AssistantError {
    /// HTTP status code reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AssistantError::InvalidInput { .. } => 400,
            AssistantError::CalendarError(crate::calendar::CalendarError::NotAuthorized(_)) => 401,
            AssistantError::OAuthError(e) if e.is_client_error() => 400,
            AssistantError::LlmError { .. }
            | AssistantError::MailError(_)
            | AssistantError::CalendarError(_)
            | AssistantError::OAuthError(_) => 502,
            AssistantError::IterationLimit { .. }
            | AssistantError::InternalError { .. }
            | AssistantError::ConfigError(_)
            | AssistantError::ToolError(_) => 500,
        }
    }

    /// Message safe to return to HTTP clients
    pub fn client_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Create LLM error
    pub fn llm_error<S: Into<String>>(message: S) -> Self {
        Self::LlmError {
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Redact credentials and secret-bearing paths, and bound the length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SECRET_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_CLIENT_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_CLIENT_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for assistant operations
pub type AssistantResult<T> = Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarError;
    use crate::mail::MailError;

    #[test]
    fn test_status_codes() {
        assert_eq!(AssistantError::invalid_input("empty").status_code(), 400);
        assert_eq!(AssistantError::llm_error("timeout").status_code(), 502);
        assert_eq!(AssistantError::internal_error("boom").status_code(), 500);
        assert_eq!(
            AssistantError::IterationLimit { max: 10 }.status_code(),
            500
        );
        assert_eq!(
            AssistantError::from(CalendarError::NotAuthorized("no token".to_string()))
                .status_code(),
            401
        );
        assert_eq!(
            AssistantError::from(CalendarError::Api {
                status: 500,
                message: "backend".to_string()
            })
            .status_code(),
            502
        );
        assert_eq!(
            AssistantError::from(MailError::NotConfigured("no creds".to_string())).status_code(),
            502
        );
    }

    #[test]
    fn test_client_message_redacts_secrets() {
        let error =
            AssistantError::internal_error("SMTP login failed: password=hunter2 token=abc456");

        let message = error.client_message();

        assert!(!message.contains("hunter2"));
        assert!(!message.contains("abc456"));
        assert!(message.contains("password=***"));
        assert!(message.contains("token=***"));
    }

    #[test]
    fn test_long_message_truncation() {
        let long_message = "x".repeat(600);
        let sanitized = sanitize_error_message(&long_message);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long_message = "é".repeat(400);
        let sanitized = sanitize_error_message(&long_message);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_file_path_redaction() {
        let message = "Failed to read /home/user/.config/friday/credentials.json";
        let sanitized = sanitize_error_message(message);

        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("credentials.json"));
    }

    #[test]
    fn test_sanitize_case_insensitive_with_colons() {
        let message = "PASSWORD: secret123 Key=xyz";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let message = "x".repeat(500);
        let sanitized = sanitize_error_message(&message);
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_error_display() {
        let error = AssistantError::IterationLimit { max: 4 };
        assert_eq!(
            error.to_string(),
            "Tool loop exceeded maximum iterations (4)"
        );
        assert_eq!(
            AssistantError::invalid_input("missing message").to_string(),
            "Invalid input: missing message"
        );
    }
}
