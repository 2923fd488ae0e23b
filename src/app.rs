//! Bootstrap: builds providers and services from configuration and wires
//! them into the agent and the HTTP state. All construction happens here so
//! the rest of the crate only sees traits.

use crate::agent::chat::{AgentSettings, ChatAgent};
use crate::calendar::{CalendarApi, GoogleCalendarClient};
use crate::config::{AssistantConfig, LlmProviderKind};
use crate::drafts::DraftStore;
use crate::error::{AssistantError, AssistantResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{OpenAiConfig, OpenAiProvider};
use crate::mail::{Mailer, SmtpMailer, SmtpSettings};
use crate::oauth::{AccessTokenSource, OAuthRegistry, TokenStore};
use crate::server::AppState;
use crate::tools::{MailSettings, ToolContext, ToolSystem};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const FALLBACK_TOKEN_FILE: &str = "token.json";

/// External services shared by the tools and the HTTP routes
#[derive(Clone)]
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub calendar: Arc<dyn CalendarApi>,
    pub oauth: Arc<OAuthRegistry>,
}

/// Create the configured LLM provider
pub fn create_provider(config: &AssistantConfig) -> AssistantResult<Arc<dyn LlmProvider>> {
    let api_key = config.get_llm_api_key()?;

    let provider_config = match config.llm.provider {
        LlmProviderKind::OpenAi => OpenAiConfig {
            api_key,
            ..Default::default()
        },
        LlmProviderKind::AzureOpenAi => OpenAiConfig::azure(
            api_key,
            config.get_llm_endpoint()?,
            config.llm.api_version.clone(),
        ),
    };

    let provider =
        OpenAiProvider::new(provider_config).map_err(|e| AssistantError::llm_error(e.to_string()))?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "LLM provider created");
    Ok(Arc::new(provider))
}

/// Create SMTP, calendar and OAuth services
pub fn build_services(config: &AssistantConfig) -> AssistantResult<Services> {
    let smtp = SmtpSettings::from_config(config);
    if !smtp.is_configured() {
        warn!(
            username_env = %config.smtp.username_env,
            password_env = %config.smtp.password_env,
            "SMTP credentials not set; sending email will fail"
        );
    }

    let oauth = OAuthRegistry::from_config(config);
    let token_store = match oauth.token_store(&config.calendar.oauth_flow) {
        Ok(Some(store)) => store,
        _ => {
            warn!(
                flow = %config.calendar.oauth_flow,
                "Calendar flow has no token file, using {}", FALLBACK_TOKEN_FILE
            );
            TokenStore::new(PathBuf::from(FALLBACK_TOKEN_FILE))
        }
    };
    let tokens = Arc::new(AccessTokenSource::new(token_store));
    let calendar = GoogleCalendarClient::new(&config.calendar, tokens)?;

    Ok(Services {
        mailer: Arc::new(SmtpMailer::new(smtp)),
        calendar: Arc::new(calendar),
        oauth: Arc::new(oauth),
    })
}

/// Initialize the tools and agent, returning the HTTP state
pub async fn build_app_state(
    config: &AssistantConfig,
    llm: Arc<dyn LlmProvider>,
    services: Services,
) -> AssistantResult<Arc<AppState>> {
    let context = ToolContext {
        drafts: DraftStore::new(),
        mailer: services.mailer.clone(),
        calendar: services.calendar.clone(),
        mail: MailSettings::from_config(config),
        default_timezone: config.calendar.default_timezone.clone(),
    };

    let mut tools = ToolSystem::new();
    tools.initialize(&config.tools, &context).await?;
    info!(tools = ?tools.list_tools(), "Tools initialized");

    let agent = ChatAgent::new(llm, Arc::new(tools), AgentSettings::from_config(config));

    Ok(Arc::new(AppState {
        agent: Arc::new(agent),
        mailer: services.mailer,
        calendar: services.calendar,
        oauth: services.oauth,
        default_timezone: config.calendar.default_timezone.clone(),
        cors_allow_any_origin: config.server.cors_allow_any_origin,
    }))
}
