//! Tool system
//!
//! Every capability the assistant offers to the model is a [`Tool`]. Tools are
//! created from the `[tools]` table of the configuration, receive shared
//! state through a [`ToolContext`], and have their parameters validated
//! against their own JSON schema before they run.

use crate::calendar::CalendarApi;
use crate::config::{AssistantConfig, ToolConfig};
use crate::drafts::DraftStore;
use crate::mail::Mailer;
use crate::tool_span;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, Instrument};

pub mod builtin;

/// Tool interface
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON schema of the parameters
    fn describe(&self) -> ToolDescription;

    /// Receives the tool's `config` table, once at startup
    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError>;

    /// Run with parameters already validated against `describe()`
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;

    /// Release resources
    async fn shutdown(&mut self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Tool description handed to the model
#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Mail identity used by tools that send
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub admin_email: Option<String>,
    pub default_subject: String,
    pub assistant_name: String,
}

impl MailSettings {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            admin_email: config.get_admin_email(),
            default_subject: config.smtp.default_subject.clone(),
            assistant_name: config.assistant.name.clone(),
        }
    }
}

/// Shared state available to builtin tools
#[derive(Clone)]
pub struct ToolContext {
    pub drafts: DraftStore,
    pub mailer: Arc<dyn Mailer>,
    pub calendar: Arc<dyn CalendarApi>,
    pub mail: MailSettings,
    pub default_timezone: String,
}

/// Registry of initialized tools
pub struct ToolSystem {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolSystem {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create and initialize every tool named in `[tools]`
    pub async fn initialize(
        &mut self,
        tool_configs: &HashMap<String, ToolConfig>,
        context: &ToolContext,
    ) -> Result<(), ToolError> {
        for (tool_name, tool_config) in tool_configs {
            let mut tool = Self::create_tool(tool_name, tool_config, context)?;

            let config = match tool_config {
                ToolConfig::Simple(_) => None,
                ToolConfig::Complex { config, .. } => Some(
                    serde_json::to_value(config)
                        .map_err(|e| ToolError::InitializationError(e.to_string()))?,
                ),
            };

            tool.initialize(config.as_ref()).await?;
            debug!(tool = %tool_name, "Tool initialized");

            self.tools.insert(tool_name.clone(), tool);
        }

        Ok(())
    }

    /// Add an already-initialized tool
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.describe().name;
        self.tools.insert(name, tool);
    }

    /// Create tool instance based on configuration
    fn create_tool(
        tool_name: &str,
        config: &ToolConfig,
        context: &ToolContext,
    ) -> Result<Box<dyn Tool>, ToolError> {
        let impl_name = match config {
            ToolConfig::Simple(impl_name) => impl_name,
            ToolConfig::Complex { implementation, .. } => implementation,
        };

        match impl_name.as_str() {
            "builtin" => Self::create_builtin_tool(tool_name, context),
            _ => Err(ToolError::UnknownImplementation(impl_name.clone())),
        }
    }

    /// Create builtin tool instances
    fn create_builtin_tool(
        tool_name: &str,
        context: &ToolContext,
    ) -> Result<Box<dyn Tool>, ToolError> {
        match tool_name {
            "web_search" => Ok(Box::new(builtin::WebSearchTool::new())),
            "get_malay_info" => Ok(Box::new(builtin::ProfileTool::new())),
            "get_user_email_id" => Ok(Box::new(builtin::ContactLookupTool::new())),
            "save_email_details" => Ok(Box::new(builtin::SaveEmailDetailsTool::new(
                context.drafts.clone(),
                context.mail.default_subject.clone(),
            ))),
            "send_email" => Ok(Box::new(builtin::SendEmailTool::new(context.clone()))),
            "save_meeting_details" => Ok(Box::new(builtin::SaveMeetingDetailsTool::new(
                context.drafts.clone(),
                context.default_timezone.clone(),
            ))),
            "schedule_meeting" => Ok(Box::new(builtin::ScheduleMeetingTool::new(
                context.clone(),
            ))),
            _ => Err(ToolError::UnknownTool(tool_name.to_string())),
        }
    }

    /// Get tool description
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Descriptions of every tool, ordered by name
    pub fn describe_all(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> =
            self.tools.values().map(|tool| tool.describe()).collect();
        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    /// Execute tool with validated parameters
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &Value,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        self.validate_parameters(tool_name, parameters)?;

        async {
            let result = tool.execute(parameters).await;
            match &result {
                Ok(_) => debug!("Tool succeeded"),
                Err(e) => debug!(error = %e, "Tool failed"),
            }
            result
        }
        .instrument(tool_span!(tool = %tool_name))
        .await
    }

    /// Validate parameters against the tool's schema
    fn validate_parameters(&self, tool_name: &str, parameters: &Value) -> Result<(), ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        let description = tool.describe();
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(parameters).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }

    /// Names of available tools, sorted
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Shutdown all tools
    pub async fn shutdown(&mut self) -> Result<(), ToolError> {
        for tool in self.tools.values_mut() {
            tool.shutdown().await?;
        }
        Ok(())
    }
}

impl Default for ToolSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Unknown tool implementation: {0}")]
    UnknownImplementation(String),
    #[error("Tool initialization failed: {0}")]
    InitializationError(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("{0}")]
    ExecutionError(String),
    #[error("Tool shutdown failed: {0}")]
    ShutdownError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockCalendar, RecordingMailer};
    use serde_json::json;

    fn context() -> ToolContext {
        ToolContext {
            drafts: DraftStore::new(),
            mailer: Arc::new(RecordingMailer::new()),
            calendar: Arc::new(MockCalendar::authorized()),
            mail: MailSettings {
                admin_email: Some("admin@example.com".to_string()),
                default_subject: "New Message".to_string(),
                assistant_name: "Friday AI Assistant".to_string(),
            },
            default_timezone: "Asia/Kolkata".to_string(),
        }
    }

    #[tokio::test]
    async fn test_tool_system_creation() {
        let tool_system = ToolSystem::new();
        assert_eq!(tool_system.list_tools().len(), 0);
    }

    #[tokio::test]
    async fn test_initializes_every_builtin() {
        let mut tool_system = ToolSystem::new();
        let tool_configs: HashMap<String, ToolConfig> = [
            "web_search",
            "get_malay_info",
            "get_user_email_id",
            "save_email_details",
            "send_email",
            "save_meeting_details",
            "schedule_meeting",
        ]
        .into_iter()
        .map(|name| (name.to_string(), ToolConfig::Simple("builtin".to_string())))
        .collect();

        tool_system
            .initialize(&tool_configs, &context())
            .await
            .unwrap();

        assert_eq!(tool_system.list_tools().len(), 7);
        let described: Vec<String> = tool_system
            .describe_all()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(described, tool_system.list_tools());
    }

    #[tokio::test]
    async fn test_unknown_tool_implementation() {
        let mut tool_system = ToolSystem::new();
        let mut tool_configs = HashMap::new();
        tool_configs.insert(
            "web_search".to_string(),
            ToolConfig::Simple("plugin".to_string()),
        );

        let result = tool_system.initialize(&tool_configs, &context()).await;
        assert!(matches!(result, Err(ToolError::UnknownImplementation(_))));
    }

    #[tokio::test]
    async fn test_unknown_builtin_tool() {
        let mut tool_system = ToolSystem::new();
        let mut tool_configs = HashMap::new();
        tool_configs.insert(
            "file_write".to_string(),
            ToolConfig::Simple("builtin".to_string()),
        );

        let result = tool_system.initialize(&tool_configs, &context()).await;
        assert!(matches!(result, Err(ToolError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn test_tool_execution_unknown_tool() {
        let tool_system = ToolSystem::new();
        let result = tool_system.execute_tool("unknown", &json!({})).await;
        assert!(matches!(result, Err(ToolError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn test_parameters_validated_before_execution() {
        let mut tool_system = ToolSystem::new();
        let mut tool_configs = HashMap::new();
        tool_configs.insert(
            "save_email_details".to_string(),
            ToolConfig::Simple("builtin".to_string()),
        );
        let ctx = context();
        tool_system.initialize(&tool_configs, &ctx).await.unwrap();

        let result = tool_system
            .execute_tool("save_email_details", &json!({"text": 42}))
            .await;

        assert!(matches!(result, Err(ToolError::ValidationError(_))));
        assert!(ctx.drafts.email().await.is_none());
    }
}
