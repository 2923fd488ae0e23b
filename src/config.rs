//! Configuration system for the Friday assistant
//!
//! Configuration is read from a TOML file. Secrets never live in the file:
//! every credential is referenced through an `*_env` field naming the
//! environment variable that holds it, and is resolved at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main assistant configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantConfig {
    #[serde(default)]
    pub assistant: AssistantSection,
    #[serde(default)]
    pub server: ServerSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub smtp: SmtpSection,
    #[serde(default)]
    pub google: GoogleSection,
    #[serde(default)]
    pub calendar: CalendarSection,
    #[serde(default)]
    pub oauth: OAuthSection,
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,
}

/// Identity of the assistant, used in outgoing mail signatures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantSection {
    #[serde(default = "default_assistant_name")]
    pub name: String,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
        }
    }
}

fn default_assistant_name() -> String {
    "Friday AI Assistant".to_string()
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow any origin, method and header (development setting)
    #[serde(default = "default_true")]
    pub cors_allow_any_origin: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_any_origin: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

/// Supported chat-completion backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LlmProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
}

impl std::fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProviderKind::OpenAi => write!(f, "openai"),
            LlmProviderKind::AzureOpenAi => write!(f, "azure_openai"),
        }
    }
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    pub provider: LlmProviderKind,
    /// Model identifier (the deployment name for Azure)
    pub model: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    /// Environment variable containing the Azure resource endpoint
    pub endpoint_env: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Replaces the built-in routing prompt when set
    pub system_prompt: Option<String>,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

fn default_api_version() -> String {
    "2025-01-01-preview".to_string()
}

/// Agent loop limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Maximum LLM round-trips per chat message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Messages retained per conversation session
    #[serde(default = "default_memory_messages")]
    pub memory_messages: usize,
    /// Sessions kept in memory; the least recently active is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            memory_messages: default_memory_messages(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_max_iterations() -> usize {
    10
}

fn default_memory_messages() -> usize {
    40
}

fn default_max_sessions() -> usize {
    256
}

/// SMTP relay section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmtpSection {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_smtp_username_env")]
    pub username_env: String,
    #[serde(default = "default_smtp_password_env")]
    pub password_env: String,
    #[serde(default = "default_admin_email_env")]
    pub admin_email_env: String,
    #[serde(default = "default_subject")]
    pub default_subject: String,
}

impl Default for SmtpSection {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username_env: default_smtp_username_env(),
            password_env: default_smtp_password_env(),
            admin_email_env: default_admin_email_env(),
            default_subject: default_subject(),
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_username_env() -> String {
    "SENDER_EMAIL".to_string()
}

fn default_smtp_password_env() -> String {
    "APP_PASSWORD".to_string()
}

fn default_admin_email_env() -> String {
    "ADMIN_EMAIL".to_string()
}

fn default_subject() -> String {
    "New Message".to_string()
}

/// Google client registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleSection {
    #[serde(default = "default_client_secrets_file")]
    pub client_secrets_file: PathBuf,
}

impl Default for GoogleSection {
    fn default() -> Self {
        Self {
            client_secrets_file: default_client_secrets_file(),
        }
    }
}

fn default_client_secrets_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

/// Google Calendar section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarSection {
    #[serde(default = "default_calendar_api")]
    pub api_base_url: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// OAuth flow whose token file authorizes calendar access
    #[serde(default = "default_calendar_flow")]
    pub oauth_flow: String,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            api_base_url: default_calendar_api(),
            calendar_id: default_calendar_id(),
            oauth_flow: default_calendar_flow(),
            default_timezone: default_timezone(),
        }
    }
}

fn default_calendar_api() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_calendar_flow() -> String {
    "calendar".to_string()
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

/// OAuth login flows exposed by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthSection {
    #[serde(default = "default_oauth_flows")]
    pub flows: Vec<OAuthFlowConfig>,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            flows: default_oauth_flows(),
        }
    }
}

/// One authorization-code flow against Google
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthFlowConfig {
    pub name: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    /// Overrides `[google].client_secrets_file` for this flow
    pub client_secrets_file: Option<PathBuf>,
    /// Where the authorized-user token is persisted; the token is returned
    /// to the browser instead when unset
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub access_type_offline: bool,
    #[serde(default = "default_true")]
    pub prompt_consent: bool,
}

fn default_oauth_flows() -> Vec<OAuthFlowConfig> {
    vec![OAuthFlowConfig {
        name: "calendar".to_string(),
        scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
        redirect_uri: "http://localhost:8000/oauth/calendar/callback".to_string(),
        client_secrets_file: None,
        token_file: Some(PathBuf::from("token.json")),
        access_type_offline: true,
        prompt_consent: true,
    }]
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolConfig {
    /// Simple form: tool_name = "identifier"
    Simple(String),
    /// Complex form: tool_name = { impl = "identifier", config = { ... } }
    Complex {
        #[serde(rename = "impl")]
        implementation: String,
        #[serde(default)]
        config: HashMap<String, serde_json::Value>,
    },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AssistantConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AssistantConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-section consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }

        if self.llm.provider == LlmProviderKind::AzureOpenAi && self.llm.endpoint_env.is_none() {
            return Err(ConfigError::InvalidConfig(
                "azure_openai provider requires llm.endpoint_env".to_string(),
            ));
        }

        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature {temperature} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidConfig(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for flow in &self.oauth.flows {
            validate_flow_name(&flow.name)?;
            if !seen.insert(flow.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Duplicate OAuth flow name '{}'",
                    flow.name
                )));
            }
            if flow.scopes.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "OAuth flow '{}' must request at least one scope",
                    flow.name
                )));
            }
        }

        if self.tools.contains_key("schedule_meeting")
            && self.oauth_flow(&self.calendar.oauth_flow).is_none()
        {
            return Err(ConfigError::InvalidConfig(format!(
                "calendar.oauth_flow '{}' does not name a configured OAuth flow",
                self.calendar.oauth_flow
            )));
        }

        Ok(())
    }

    /// Look up an OAuth flow by name
    pub fn oauth_flow(&self, name: &str) -> Option<&OAuthFlowConfig> {
        self.oauth.flows.iter().find(|flow| flow.name == name)
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: &str) -> Option<String> {
        std::env::var(env_var_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        Self::get_env_var_optional(env_var_name)
            .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Get the Azure resource endpoint from environment variable
    pub fn get_llm_endpoint(&self) -> Result<String, ConfigError> {
        let env_name = self.llm.endpoint_env.as_deref().ok_or_else(|| {
            ConfigError::InvalidConfig("llm.endpoint_env is not set".to_string())
        })?;
        Self::get_env_var_required(env_name)
    }

    /// SMTP login (also used as the From address)
    pub fn get_smtp_username(&self) -> Option<String> {
        Self::get_env_var_optional(&self.smtp.username_env)
    }

    pub fn get_smtp_password(&self) -> Option<String> {
        Self::get_env_var_optional(&self.smtp.password_env)
    }

    /// Address that receives a copy of every outgoing notification
    pub fn get_admin_email(&self) -> Option<String> {
        Self::get_env_var_optional(&self.smtp.admin_email_env)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
temperature = 0.8

[tools]
web_search = "builtin"
save_email_details = "builtin"
send_email = "builtin"
save_meeting_details = "builtin"
schedule_meeting = "builtin"
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

/// Flow names appear in URL paths
fn validate_flow_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if name.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidConfig(format!(
            "OAuth flow name '{name}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
