//! Google OAuth2 authorization-code flows
//!
//! - [`client`]: client-secrets loading, consent URL, code exchange, refresh
//! - [`token`]: the authorized-user token file and an access-token source
//!   that refreshes it
//! - [`registry`]: named flows with `state` bookkeeping for the HTTP routes

use thiserror::Error;

pub mod client;
pub mod registry;
pub mod token;

pub use client::{ClientSecrets, GoogleOAuthClient, OAuthClientCredentials, TokenResponse};
pub use registry::{AuthorizationOutcome, OAuthRegistry};
pub use token::{AccessTokenSource, StoredToken, TokenStore};

/// OAuth errors
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Unknown OAuth flow: {0}")]
    UnknownFlow(String),
    #[error("Invalid or expired OAuth state")]
    InvalidState,
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("Client secrets unavailable: {0}")]
    ClientSecrets(String),
    #[error("Token endpoint returned {status}: {message}")]
    TokenEndpoint { status: u16, message: String },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Token storage error: {0}")]
    Storage(String),
}

impl OAuthError {
    /// Errors caused by the browser request rather than by us or Google
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OAuthError::UnknownFlow(_) | OAuthError::InvalidState | OAuthError::AuthorizationDenied(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(OAuthError::InvalidState.is_client_error());
        assert!(OAuthError::UnknownFlow("x".to_string()).is_client_error());
        assert!(OAuthError::AuthorizationDenied("access_denied".to_string()).is_client_error());
        assert!(!OAuthError::Http("reset".to_string()).is_client_error());
        assert!(!OAuthError::TokenEndpoint {
            status: 400,
            message: "invalid_grant".to_string()
        }
        .is_client_error());
    }
}
