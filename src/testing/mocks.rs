//! Mock implementations for testing
//!
//! Provides mock LlmProvider, Mailer, and CalendarApi implementations
//! to enable comprehensive testing without external dependencies.

use crate::calendar::{CalendarApi, CalendarError, CalendarEvent, CreatedEvent};
use crate::drafts::DraftStore;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
    ToolCall,
};
use crate::mail::{MailError, Mailer, OutgoingEmail};
use crate::tools::{MailSettings, ToolContext};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One scripted model turn
#[derive(Debug, Clone)]
pub struct MockReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
        }
    }

    pub fn tool(name: impl Into<String>, arguments: Value) -> Self {
        Self::tools(vec![(name.into(), arguments)])
    }

    pub fn tools(calls: Vec<(String, Value)>) -> Self {
        Self {
            content: None,
            tool_calls: calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, arguments))| ToolCall::new(format!("call_{i}"), name, arguments))
                .collect(),
        }
    }
}

/// Mock LLM provider for testing
///
/// Replies are returned in order and cycle once exhausted.
#[derive(Debug)]
pub struct MockLlmProvider {
    pub replies: Vec<MockReply>,
    pub current_response: Arc<Mutex<usize>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub should_fail: bool,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_replies(responses.into_iter().map(MockReply::text).collect())
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            current_response: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::with_replies(vec![])
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Call one tool, then answer with `reply`
    pub fn tool_then_reply(name: &str, arguments: Value, reply: impl Into<String>) -> Self {
        Self::with_replies(vec![MockReply::tool(name, arguments), MockReply::text(reply)])
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request);

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let mut current = self.current_response.lock().await;
        let reply = if self.replies.is_empty() {
            MockReply::text("Mock response")
        } else {
            self.replies[*current % self.replies.len()].clone()
        };
        *current += 1;

        let (finish_reason, tool_calls) = if reply.tool_calls.is_empty() {
            (FinishReason::Stop, None)
        } else {
            (FinishReason::ToolCalls, Some(reply.tool_calls))
        };

        Ok(CompletionResponse {
            content: reply.content,
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason,
            tool_calls,
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Mailer that records every batch instead of sending
#[derive(Debug, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<Vec<OutgoingEmail>>>>,
    pub failure: Option<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    pub async fn batches(&self) -> Vec<Vec<OutgoingEmail>> {
        self.sent.lock().await.clone()
    }

    pub async fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .flatten()
            .map(|email| email.to.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_all(&self, emails: &[OutgoingEmail]) -> Result<(), MailError> {
        if let Some(message) = &self.failure {
            return Err(MailError::Transport(message.clone()));
        }
        self.sent.lock().await.push(emails.to_vec());
        Ok(())
    }
}

/// Calendar that records inserted events
#[derive(Debug)]
pub struct MockCalendar {
    pub events: Arc<Mutex<Vec<CalendarEvent>>>,
    pub authorized: bool,
    pub failure: Option<(u16, String)>,
}

impl MockCalendar {
    pub fn authorized() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            authorized: true,
            failure: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            authorized: false,
            ..Self::authorized()
        }
    }

    pub fn with_api_failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            failure: Some((status, message.into())),
            ..Self::authorized()
        }
    }

    pub fn event_link(&self) -> String {
        "https://www.google.com/calendar/event?eid=mock".to_string()
    }

    pub async fn inserted_events(&self) -> Vec<CalendarEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl CalendarApi for MockCalendar {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<CreatedEvent, CalendarError> {
        if !self.authorized {
            return Err(CalendarError::NotAuthorized("no token".to_string()));
        }
        if let Some((status, message)) = &self.failure {
            return Err(CalendarError::Api {
                status: *status,
                message: message.clone(),
            });
        }

        let mut events = self.events.lock().await;
        events.push(event.clone());
        Ok(CreatedEvent {
            id: format!("event-{}", events.len()),
            html_link: self.event_link(),
        })
    }

    async fn is_authorized(&self) -> bool {
        self.authorized
    }
}

/// Tool context wired to mocks, with an admin address configured
pub fn test_tool_context(mailer: Arc<RecordingMailer>) -> ToolContext {
    ToolContext {
        drafts: DraftStore::new(),
        mailer,
        calendar: Arc::new(MockCalendar::authorized()),
        mail: MailSettings {
            admin_email: Some("admin@example.com".to_string()),
            default_subject: "New Message".to_string(),
            assistant_name: "Friday AI Assistant".to_string(),
        },
        default_timezone: "Asia/Kolkata".to_string(),
    }
}
