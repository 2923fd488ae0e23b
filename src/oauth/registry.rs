//! Named OAuth flows exposed over HTTP
//!
//! `begin` hands out the consent URL and remembers a random `state`;
//! `complete` accepts it exactly once within [`STATE_TTL`]. Client secrets are
//! read per request so the server starts before they are provisioned.

use crate::config::{AssistantConfig, OAuthFlowConfig};
use crate::oauth::client::{ClientSecrets, GoogleOAuthClient};
use crate::oauth::token::{StoredToken, TokenStore};
use crate::oauth::OAuthError;
use crate::oauth_span;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, Instrument};
use uuid::Uuid;

pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Result of a completed authorization
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthorizationOutcome {
    /// Token written to the flow's token file
    Saved { flow: String, path: PathBuf },
    /// Flow has no token file; the caller gets the token itself
    Returned { flow: String, token: StoredToken },
}

struct PendingState {
    flow: String,
    issued: Instant,
}

/// All configured flows plus outstanding `state` values
pub struct OAuthRegistry {
    flows: HashMap<String, OAuthFlowConfig>,
    default_secrets: PathBuf,
    pending: Mutex<HashMap<String, PendingState>>,
    state_ttl: Duration,
}

impl OAuthRegistry {
    pub fn new(flows: Vec<OAuthFlowConfig>, default_secrets: PathBuf) -> Self {
        Self {
            flows: flows
                .into_iter()
                .map(|flow| (flow.name.clone(), flow))
                .collect(),
            default_secrets,
            pending: Mutex::new(HashMap::new()),
            state_ttl: STATE_TTL,
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(
            config.oauth.flows.clone(),
            config.google.client_secrets_file.clone(),
        )
    }

    /// Override the state lifetime
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn flow(&self, name: &str) -> Result<&OAuthFlowConfig, OAuthError> {
        self.flows
            .get(name)
            .ok_or_else(|| OAuthError::UnknownFlow(name.to_string()))
    }

    pub fn flow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Token store for a flow that persists its token
    pub fn token_store(&self, name: &str) -> Result<Option<TokenStore>, OAuthError> {
        Ok(self.flow(name)?.token_file.clone().map(TokenStore::new))
    }

    async fn client_for(&self, flow: &OAuthFlowConfig) -> Result<GoogleOAuthClient, OAuthError> {
        let path = flow
            .client_secrets_file
            .as_ref()
            .unwrap_or(&self.default_secrets);
        let secrets = ClientSecrets::load(path).await?;
        GoogleOAuthClient::new(secrets.into_credentials())
    }

    /// Consent URL for `name`, with a fresh state remembered
    pub async fn begin(&self, name: &str) -> Result<String, OAuthError> {
        let flow = self.flow(name)?;
        let client = self.client_for(flow).await?;
        let state = Uuid::new_v4().simple().to_string();
        let url = client.authorization_url(flow, &state)?;

        let mut pending = self.pending.lock().await;
        let ttl = self.state_ttl;
        pending.retain(|_, entry| entry.issued.elapsed() < ttl);
        pending.insert(
            state,
            PendingState {
                flow: name.to_string(),
                issued: Instant::now(),
            },
        );

        info!(flow = name, "OAuth consent URL issued");
        Ok(url)
    }

    /// Check the state, exchange the code and store or return the token
    pub async fn complete(
        &self,
        name: &str,
        code: &str,
        state: &str,
    ) -> Result<AuthorizationOutcome, OAuthError> {
        let flow = self.flow(name)?;
        self.consume_state(name, state).await?;

        async {
            let client = self.client_for(flow).await?;
            let response = client.exchange_code(code, &flow.redirect_uri).await?;
            let token =
                StoredToken::from_response(response, client.credentials(), &flow.scopes, None);

            match &flow.token_file {
                Some(path) => {
                    TokenStore::new(path.clone()).save(&token).await?;
                    info!(path = %path.display(), "Authorization token saved");
                    Ok(AuthorizationOutcome::Saved {
                        flow: name.to_string(),
                        path: path.clone(),
                    })
                }
                None => {
                    info!("Authorization completed without persistence");
                    Ok(AuthorizationOutcome::Returned {
                        flow: name.to_string(),
                        token,
                    })
                }
            }
        }
        .instrument(oauth_span!(flow = name))
        .await
    }

    async fn consume_state(&self, name: &str, state: &str) -> Result<(), OAuthError> {
        let mut pending = self.pending.lock().await;
        match pending.remove(state) {
            Some(entry) if entry.flow == name && entry.issued.elapsed() < self.state_ttl => Ok(()),
            _ => Err(OAuthError::InvalidState),
        }
    }
}
