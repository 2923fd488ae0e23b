//! Google OAuth2 client
//!
//! Speaks the authorization-code grant against the endpoints named in the
//! client-secrets file downloaded from the Google Cloud console.

use crate::config::OAuthFlowConfig;
use crate::oauth::OAuthError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client identity and endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Google's client-secrets JSON; web and desktop clients nest the same fields
/// under different keys
#[derive(Debug, Clone, Deserialize)]
pub enum ClientSecrets {
    #[serde(rename = "web")]
    Web(OAuthClientCredentials),
    #[serde(rename = "installed")]
    Installed(OAuthClientCredentials),
}

impl ClientSecrets {
    pub fn from_json(content: &str) -> Result<Self, OAuthError> {
        serde_json::from_str(content)
            .map_err(|e| OAuthError::ClientSecrets(format!("malformed client secrets: {e}")))
    }

    pub async fn load(path: &Path) -> Result<Self, OAuthError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OAuthError::ClientSecrets(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn credentials(&self) -> &OAuthClientCredentials {
        match self {
            ClientSecrets::Web(credentials) | ClientSecrets::Installed(credentials) => credentials,
        }
    }

    pub fn into_credentials(self) -> OAuthClientCredentials {
        match self {
            ClientSecrets::Web(credentials) | ClientSecrets::Installed(credentials) => credentials,
        }
    }
}

/// Successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_ref()
            .map(|scope| scope.split_whitespace().map(String::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth client bound to one set of client credentials
#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    credentials: OAuthClientCredentials,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(credentials: OAuthClientCredentials) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OAuthError::Http(e.to_string()))?;
        Ok(Self { credentials, http })
    }

    pub fn credentials(&self) -> &OAuthClientCredentials {
        &self.credentials
    }

    /// Consent-screen URL for a flow
    pub fn authorization_url(
        &self,
        flow: &OAuthFlowConfig,
        state: &str,
    ) -> Result<String, OAuthError> {
        let scope = flow.scopes.join(" ");
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", flow.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("include_granted_scopes", "true"),
        ];
        if flow.access_type_offline {
            params.push(("access_type", "offline"));
        }
        if flow.prompt_consent {
            params.push(("prompt", "consent"));
        }

        let url = url::Url::parse_with_params(&self.credentials.auth_uri, &params)
            .map_err(|e| OAuthError::ClientSecrets(format!("invalid auth_uri: {e}")))?;
        Ok(url.into())
    }

    /// Trade an authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        debug!(token_uri = %self.credentials.token_uri, "Exchanging authorization code");
        self.token_request(&[
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Obtain a fresh access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        debug!(token_uri = %self.credentials.token_uri, "Refreshing access token");
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| OAuthError::Http(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorBody>(&body) {
                Ok(error) => match error.error_description {
                    Some(description) => format!("{}: {description}", error.error),
                    None => error.error,
                },
                Err(_) => body,
            };
            warn!(status = status.as_u16(), "Token endpoint rejected request");
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| OAuthError::Http(format!("invalid token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEB_SECRETS: &str = r#"{
        "web": {
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "project_id": "friday",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost:8000/oauth/calendar/callback"]
        }
    }"#;

    fn flow(prompt_consent: bool) -> OAuthFlowConfig {
        OAuthFlowConfig {
            name: "calendar".to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/calendar".to_string(),
                "openid".to_string(),
            ],
            redirect_uri: "http://localhost:8000/oauth/calendar/callback".to_string(),
            client_secrets_file: None,
            token_file: None,
            access_type_offline: true,
            prompt_consent,
        }
    }

    #[test]
    fn test_parse_web_and_installed_secrets() {
        let web = ClientSecrets::from_json(WEB_SECRETS).unwrap();
        assert!(matches!(web, ClientSecrets::Web(_)));
        assert_eq!(web.credentials().client_id, "123.apps.googleusercontent.com");

        let installed = ClientSecrets::from_json(
            r#"{"installed": {"client_id": "desk", "client_secret": "s"}}"#,
        )
        .unwrap();
        assert!(matches!(installed, ClientSecrets::Installed(_)));
        assert_eq!(installed.credentials().token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_malformed_secrets_rejected() {
        assert!(matches!(
            ClientSecrets::from_json(r#"{"service_account": {}}"#),
            Err(OAuthError::ClientSecrets(_))
        ));
    }

    #[test]
    fn test_authorization_url_parameters() {
        let client =
            GoogleOAuthClient::new(ClientSecrets::from_json(WEB_SECRETS).unwrap().into_credentials())
                .unwrap();
        let url = client.authorization_url(&flow(true), "state-123").unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "123.apps.googleusercontent.com");
        assert_eq!(
            pairs["scope"],
            "https://www.googleapis.com/auth/calendar openid"
        );
        assert_eq!(pairs["state"], "state-123");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["include_granted_scopes"], "true");
        assert_eq!(pairs["prompt"], "consent");
    }

    #[test]
    fn test_authorization_url_without_consent_prompt() {
        let client =
            GoogleOAuthClient::new(ClientSecrets::from_json(WEB_SECRETS).unwrap().into_credentials())
                .unwrap();
        let url = client.authorization_url(&flow(false), "s").unwrap();
        assert!(!url.contains("prompt="));
    }

    #[test]
    fn test_granted_scopes() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "ya29", "expires_in": 3599, "scope": "a b"}"#,
        )
        .unwrap();
        assert_eq!(
            response.granted_scopes(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert!(response.refresh_token.is_none());
    }
}
