//! OAuth2 Token Refresh Module
//!
//! Refreshes mailbox access tokens with the OAuth client identity that
//! matches the connection's category.

use oauth2::{
    basic::BasicClient,
    reqwest::async_http_client,
    AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sync::models::{ConnectionCategory, REFRESH_MARGIN_SECS};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("No OAuth client configured for {0} mailboxes")]
    NotConfigured(ConnectionCategory),
    #[error("No refresh token stored for this mailbox")]
    MissingRefreshToken,
    #[error("OAuth2 error: {0}")]
    OAuth2(String),
    #[error("Token refresh failed: {0}")]
    TokenExchange(String),
    #[error("Token refresh timed out")]
    Timeout,
}

/// One OAuth client identity (id/secret pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthClientConfig {
    /// Google client identity with the standard endpoints
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

/// Client identities per connection category; never interchangeable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthClients {
    pub personal: Option<OAuthClientConfig>,
    pub workspace: Option<OAuthClientConfig>,
}

impl OAuthClients {
    pub fn for_category(&self, category: ConnectionCategory) -> Result<&OAuthClientConfig, OAuthError> {
        let config = match category {
            ConnectionCategory::Personal => self.personal.as_ref(),
            ConnectionCategory::Workspace => self.workspace.as_ref(),
        };
        config.ok_or(OAuthError::NotConfigured(category))
    }
}

/// New credential returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Only set when the provider rotated the refresh token
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
}

/// Whether a token expiring at `expires_at` must be refreshed at `now`
///
/// Unknown expiry counts as expired.
pub fn needs_refresh(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at <= now + REFRESH_MARGIN_SECS,
        None => true,
    }
}

fn build_client(config: &OAuthClientConfig) -> Result<BasicClient, OAuthError> {
    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(config.auth_url.clone()).map_err(|e| OAuthError::OAuth2(e.to_string()))?,
        Some(TokenUrl::new(config.token_url.clone()).map_err(|e| OAuthError::OAuth2(e.to_string()))?),
    ))
}

/// Exchange a refresh token for a new access token
pub async fn refresh_access_token(
    config: &OAuthClientConfig,
    refresh_token: &str,
    timeout: Duration,
) -> Result<RefreshedToken, OAuthError> {
    if refresh_token.is_empty() {
        return Err(OAuthError::MissingRefreshToken);
    }

    let client = build_client(config)?;
    let refresh_token = RefreshToken::new(refresh_token.to_string());

    let request = client
        .exchange_refresh_token(&refresh_token)
        .request_async(async_http_client);

    let token_result = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| OAuthError::Timeout)?
        .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;

    let lifetime = token_result
        .expires_in()
        .map(|d| d.as_secs() as i64)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Ok(RefreshedToken {
        access_token: token_result.access_token().secret().clone(),
        refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
        expires_at: chrono::Utc::now().timestamp() + lifetime,
    })
}
