//! Persisted OAuth tokens
//!
//! The file format is Google's "authorized user" JSON, so a token written
//! here can be read by Google's own client libraries and vice versa.

use crate::oauth::client::{GoogleOAuthClient, OAuthClientCredentials, TokenResponse};
use crate::oauth::OAuthError;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Refresh when the access token has less than this left
const REFRESH_MARGIN_SECS: i64 = 60;

/// Google authorized-user token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Access token
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Build from a token endpoint response
    ///
    /// Google omits the refresh token on refresh responses and sometimes the
    /// scope; `previous` supplies both.
    pub fn from_response(
        response: TokenResponse,
        credentials: &OAuthClientCredentials,
        requested_scopes: &[String],
        previous: Option<&StoredToken>,
    ) -> Self {
        let expiry = response
            .expires_in
            .map(|secs| Utc::now().trunc_subsecs(0) + Duration::seconds(secs));
        let scopes = response
            .granted_scopes()
            .or_else(|| previous.map(|token| token.scopes.clone()))
            .unwrap_or_else(|| requested_scopes.to_vec());
        let refresh_token = response
            .refresh_token
            .or_else(|| previous.and_then(|token| token.refresh_token.clone()));

        Self {
            token: response.access_token,
            refresh_token,
            token_uri: credentials.token_uri.clone(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            scopes,
            expiry,
        }
    }

    /// True when the token is expired or about to be
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expiry {
            Some(expiry) => expiry - now <= margin,
            None => false,
        }
    }

    pub fn client_credentials(&self) -> OAuthClientCredentials {
        OAuthClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_uri: String::new(),
            token_uri: self.token_uri.clone(),
            redirect_uris: Vec::new(),
        }
    }
}

/// A token file on disk
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no token has been saved yet
    pub async fn load(&self) -> Result<Option<StoredToken>, OAuthError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OAuthError::Storage(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            OAuthError::Storage(format!("malformed token file {}: {e}", self.path.display()))
        })
    }

    /// Write through a temporary sibling and rename it into place
    pub async fn save(&self, token: &StoredToken) -> Result<(), OAuthError> {
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| OAuthError::Storage(e.to_string()))?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OAuthError::Storage(e.to_string()))?;
        }

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| OAuthError::Storage(format!("cannot write {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| OAuthError::Storage(format!("cannot replace {}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), "Token file written");
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// Hands out a valid access token, refreshing the stored one as needed
pub struct AccessTokenSource {
    store: TokenStore,
    // held across load, refresh and save
    refresh_lock: Mutex<()>,
}

impl AccessTokenSource {
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Whether a token file is present and readable
    pub async fn is_authorized(&self) -> bool {
        matches!(self.store.load().await, Ok(Some(_)))
    }

    pub async fn access_token(&self) -> Result<String, OAuthError> {
        let _guard = self.refresh_lock.lock().await;

        let token = self.store.load().await?.ok_or_else(|| {
            OAuthError::NotAuthorized(format!("no token at {}", self.store.path().display()))
        })?;

        if !token.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(token.token);
        }

        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            OAuthError::NotAuthorized("access token expired and no refresh token".to_string())
        })?;

        let client = GoogleOAuthClient::new(token.client_credentials())?;
        let response = client.refresh(refresh_token).await.map_err(|e| match e {
            OAuthError::TokenEndpoint { status: 400, message }
            | OAuthError::TokenEndpoint { status: 401, message } => {
                OAuthError::NotAuthorized(format!("refresh rejected: {message}"))
            }
            other => other,
        })?;

        let refreshed = StoredToken::from_response(
            response,
            &token.client_credentials(),
            &token.scopes,
            Some(&token),
        );
        self.store.save(&refreshed).await?;
        info!(path = %self.store.path().display(), "Access token refreshed");

        Ok(refreshed.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
            expiry,
        }
    }

    #[test]
    fn test_expires_within() {
        let now = Utc::now();
        let margin = Duration::seconds(60);

        assert!(token(Some(now + Duration::seconds(30))).expires_within(now, margin));
        assert!(token(Some(now - Duration::seconds(5))).expires_within(now, margin));
        assert!(!token(Some(now + Duration::seconds(600))).expires_within(now, margin));
        assert!(!token(None).expires_within(now, margin));
    }

    #[test]
    fn test_reads_google_authorized_user_format() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "GOCSPX",
            "scopes": ["https://www.googleapis.com/auth/calendar"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2025-12-28T10:30:00.123456Z"
        }"#;

        let parsed: StoredToken = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.token, "ya29.a0");
        assert_eq!(parsed.refresh_token.as_deref(), Some("1//0g"));
        assert!(parsed.expiry.is_some());
    }

    #[test]
    fn test_from_response_keeps_previous_refresh_token() {
        let previous = token(None);
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "new", "expires_in": 3600}"#).unwrap();

        let refreshed = StoredToken::from_response(
            response,
            &previous.client_credentials(),
            &[],
            Some(&previous),
        );

        assert_eq!(refreshed.token, "new");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(refreshed.scopes, previous.scopes);
        assert!(refreshed.expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_store_round_trip_and_missing_file() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));

        assert!(store.load().await.unwrap().is_none());
        assert!(!store.exists().await);

        let saved = token(Some(Utc::now().trunc_subsecs(0)));
        store.save(&saved).await.unwrap();

        assert!(store.exists().await);
        assert_eq!(store.load().await.unwrap(), Some(saved));
        assert!(!dir.path().join("nested").join("token.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_malformed_token_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        let result = TokenStore::new(&path).load().await;
        assert!(matches!(result, Err(OAuthError::Storage(_))));
    }

    #[tokio::test]
    async fn test_access_token_without_file_is_not_authorized() {
        let dir = tempdir().unwrap();
        let source = AccessTokenSource::new(TokenStore::new(dir.path().join("token.json")));

        assert!(!source.is_authorized().await);
        assert!(matches!(
            source.access_token().await,
            Err(OAuthError::NotAuthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_refresh() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store
            .save(&token(Some(Utc::now() + Duration::hours(1))))
            .await
            .unwrap();

        let source = AccessTokenSource::new(store);
        assert_eq!(source.access_token().await.unwrap(), "ya29.access");
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let mut expired = token(Some(Utc::now() - Duration::hours(1)));
        expired.refresh_token = None;
        store.save(&expired).await.unwrap();

        let source = AccessTokenSource::new(store);
        assert!(matches!(
            source.access_token().await,
            Err(OAuthError::NotAuthorized(_))
        ));
    }
}
