//! Tool-calling chat loop

use crate::agent::memory::ConversationMemory;
use crate::agent::prompt::{system_prompt_with_date, DEFAULT_SYSTEM_PROMPT};
use crate::chat_span;
use crate::config::AssistantConfig;
use crate::error::{AssistantError, AssistantResult};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider, Message, ToolCall};
use crate::tools::{ToolDescription, ToolSystem};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

pub const DEFAULT_SESSION: &str = "default";

/// Model settings for the loop
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_iterations: usize,
    pub memory_messages: usize,
    pub max_sessions: usize,
    /// IANA zone the current date is stamped in
    pub timezone: String,
}

impl AgentSettings {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            system_prompt: config
                .llm
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_iterations: config.agent.max_iterations,
            memory_messages: config.agent.memory_messages,
            max_sessions: config.agent.max_sessions,
            timezone: config.calendar.default_timezone.clone(),
        }
    }
}

/// Final answer of one chat turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub tools_used: Vec<String>,
}

pub struct ChatAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolSystem>,
    memory: ConversationMemory,
    settings: AgentSettings,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolSystem>, settings: AgentSettings) -> Self {
        Self {
            memory: ConversationMemory::new(settings.memory_messages)
                .with_max_sessions(settings.max_sessions),
            llm,
            tools,
            settings,
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn tools(&self) -> &Arc<ToolSystem> {
        &self.tools
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer one user message within a session
    pub async fn chat(&self, session: &str, message: &str) -> AssistantResult<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::invalid_input("Message must not be empty"));
        }

        async {
            let history = self.memory.history(session).await;
            let mut messages = self.build_initial_messages(history, message);
            let available_tools = self.tools.describe_all();
            let mut tools_used = Vec::new();

            for iteration in 1..=self.settings.max_iterations {
                let request = self.create_completion_request(messages.clone(), &available_tools);
                debug!(
                    iteration,
                    messages = request.messages.len(),
                    tools = available_tools.len(),
                    "LLM request"
                );

                let response = self
                    .llm
                    .complete(request)
                    .await
                    .map_err(|e| AssistantError::llm_error(e.to_string()))?;
                debug!(
                    tool_calls = response.tool_calls.as_ref().map(Vec::len).unwrap_or(0),
                    finish_reason = ?response.finish_reason,
                    tokens = response.usage.total_tokens,
                    "LLM response"
                );

                let tool_calls = match response.tool_calls.as_deref() {
                    Some(calls) if !calls.is_empty() => calls.to_vec(),
                    _ => {
                        let reply = Self::extract_final_content(&response);
                        self.memory
                            .record(session, Message::user(message), Message::assistant(&reply))
                            .await;
                        info!(iterations = iteration, tools_used = ?tools_used, "Chat completed");
                        return Ok(ChatReply { reply, tools_used });
                    }
                };

                Self::add_assistant_response(&mut messages, &response);
                tools_used.extend(tool_calls.iter().map(|call| call.name.clone()));
                let tool_results = self.execute_tool_calls(&tool_calls).await;
                Self::add_tool_results(&mut messages, &tool_results);
            }

            warn!(max = self.settings.max_iterations, "Chat exceeded iteration limit");
            Err(AssistantError::IterationLimit {
                max: self.settings.max_iterations,
            })
        }
        .instrument(chat_span!(session = %session))
        .await
    }

    /// System prompt, session history, then the new message (pure function)
    fn build_initial_messages(&self, history: Vec<Message>, message: &str) -> Vec<Message> {
        let mut messages = vec![Message::system(system_prompt_with_date(
            &self.settings.system_prompt,
            chrono::Utc::now(),
            &self.settings.timezone,
        ))];
        messages.extend(history);
        messages.push(Message::user(message));
        messages
    }

    /// Create completion request (pure function)
    fn create_completion_request(
        &self,
        messages: Vec<Message>,
        available_tools: &[ToolDescription],
    ) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tools: if available_tools.is_empty() {
                None
            } else {
                Some(available_tools.to_vec())
            },
            tool_choice: None,
            metadata: HashMap::new(),
        }
    }

    /// Run tool calls in the order the model gave them
    async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<String> {
        let mut tool_results = Vec::with_capacity(tool_calls.len());

        for tool_call in tool_calls {
            if let Some(parse_error) = &tool_call.argument_error {
                warn!(tool = %tool_call.name, error = %parse_error, "Tool call arguments unusable");
                tool_results.push(format!(
                    "Tool {} failed: invalid arguments: {}",
                    tool_call.name, parse_error
                ));
                continue;
            }

            debug!(tool = %tool_call.name, "Executing tool call");
            let result = match self
                .tools
                .execute_tool(&tool_call.name, &tool_call.arguments)
                .await
            {
                Ok(result) => format!("Tool {} returned: {}", tool_call.name, Self::render(&result)),
                Err(e) => {
                    warn!(tool = %tool_call.name, error = %e, "Tool call failed");
                    format!("Tool {} failed: {}", tool_call.name, e)
                }
            };
            tool_results.push(result);
        }

        tool_results
    }

    /// Strings go back verbatim, everything else as JSON (pure function)
    fn render(result: &serde_json::Value) -> String {
        match result {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Add assistant response to messages (pure function)
    fn add_assistant_response(messages: &mut Vec<Message>, response: &CompletionResponse) {
        if let Some(content) = response.content.as_deref().filter(|c| !c.is_empty()) {
            messages.push(Message::assistant(content));
        }
    }

    /// Add tool results to messages (pure function)
    fn add_tool_results(messages: &mut Vec<Message>, tool_results: &[String]) {
        if !tool_results.is_empty() {
            messages.push(Message::user(format!(
                "Tool results:\n{}",
                tool_results.join("\n")
            )));
        }
    }

    /// Extract final content from LLM response (pure extraction)
    fn extract_final_content(response: &CompletionResponse) -> String {
        response.content.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::MessageRole;
    use crate::testing::mocks::{MockLlmProvider, MockReply};
    use serde_json::json;

    fn settings(max_iterations: usize) -> AgentSettings {
        AgentSettings {
            model: "gpt-4o".to_string(),
            system_prompt: "Be helpful.".to_string(),
            temperature: Some(0.8),
            max_tokens: None,
            max_iterations,
            memory_messages: 10,
            max_sessions: 8,
            timezone: "Asia/Kolkata".to_string(),
        }
    }

    fn agent(provider: Arc<MockLlmProvider>, max_iterations: usize) -> ChatAgent {
        ChatAgent::new(provider, Arc::new(ToolSystem::new()), settings(max_iterations))
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let provider = Arc::new(MockLlmProvider::single_response("Hi there"));
        let agent = agent(provider.clone(), 5);

        let reply = agent.chat(DEFAULT_SESSION, "hello").await.unwrap();
        assert_eq!(reply.reply, "Hi there");
        assert!(reply.tools_used.is_empty());

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, MessageRole::System);
        assert!(requests[0].messages[0].content.starts_with("Be helpful."));
        assert!(requests[0].messages[0].content.ends_with("(Asia/Kolkata)"));
        assert!(requests[0].tools.is_none());
        assert_eq!(requests[0].temperature, Some(0.8));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let provider = Arc::new(MockLlmProvider::single_response("unused"));
        let agent = agent(provider.clone(), 5);

        let error = agent.chat(DEFAULT_SESSION, "   ").await.unwrap_err();
        assert_eq!(error.status_code(), 400);
        assert!(provider.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_back_to_model() {
        let provider = Arc::new(MockLlmProvider::tool_then_reply(
            "missing_tool",
            json!({}),
            "Sorry, I could not do that",
        ));
        let agent = agent(provider.clone(), 5);

        let reply = agent.chat(DEFAULT_SESSION, "do it").await.unwrap();
        assert_eq!(reply.reply, "Sorry, I could not do that");
        assert_eq!(reply.tools_used, vec!["missing_tool"]);

        let requests = provider.requests().await;
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, MessageRole::User);
        assert_eq!(
            last.content,
            "Tool results:\nTool missing_tool failed: Unknown tool: missing_tool"
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_reported_back_to_model() {
        let provider = Arc::new(MockLlmProvider::with_replies(vec![
            MockReply {
                content: None,
                tool_calls: vec![ToolCall::invalid(
                    "call_0",
                    "send_email",
                    "key must be a string at line 1 column 2",
                )],
            },
            MockReply::text("Let me try that again."),
        ]));
        let agent = agent(provider.clone(), 5);

        let reply = agent.chat(DEFAULT_SESSION, "send it").await.unwrap();
        assert_eq!(reply.reply, "Let me try that again.");
        assert_eq!(reply.tools_used, vec!["send_email"]);

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].messages.last().unwrap().content,
            "Tool results:\nTool send_email failed: invalid arguments: \
             key must be a string at line 1 column 2"
        );
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let provider = Arc::new(MockLlmProvider::with_replies(vec![MockReply::tool(
            "missing_tool",
            json!({}),
        )]));
        let agent = agent(provider.clone(), 3);

        let error = agent.chat(DEFAULT_SESSION, "loop").await.unwrap_err();
        assert!(matches!(error, AssistantError::IterationLimit { max: 3 }));
        assert_eq!(provider.requests().await.len(), 3);
        assert!(agent.memory().history(DEFAULT_SESSION).await.is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_maps_to_llm_error() {
        let agent = agent(Arc::new(MockLlmProvider::with_failure()), 3);
        let error = agent.chat(DEFAULT_SESSION, "hello").await.unwrap_err();
        assert!(matches!(error, AssistantError::LlmError { .. }));
        assert_eq!(error.status_code(), 502);
    }

    #[tokio::test]
    async fn test_history_carried_per_session() {
        let provider = Arc::new(MockLlmProvider::new(vec![
            "first".to_string(),
            "second".to_string(),
            "third".to_string(),
        ]));
        let agent = agent(provider.clone(), 3);

        agent.chat("alice", "one").await.unwrap();
        agent.chat("alice", "two").await.unwrap();
        agent.chat("bob", "three").await.unwrap();

        let requests = provider.requests().await;
        // system + 2 history + user
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[1].content, "one");
        assert_eq!(requests[1].messages[2].content, "first");
        // bob starts fresh
        assert_eq!(requests[2].messages.len(), 2);
    }

    #[test]
    fn test_render_strings_verbatim() {
        assert_eq!(ChatAgent::render(&json!("plain")), "plain");
        assert_eq!(ChatAgent::render(&json!({"a": 1})), "{\"a\":1}");
    }
}
