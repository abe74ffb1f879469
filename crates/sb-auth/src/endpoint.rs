//! Token endpoint wire contract
//!
//! Form-encoded POSTs against the accounts service for the two grant types
//! the extension uses: `authorization_code` (first login, with PKCE) and
//! `refresh_token` (renewal). The trait seam keeps the refresh coordinator
//! and flow driver testable without a network.

use async_trait::async_trait;
use reqwest::Client;
use sb_types::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::OAuthConfig;

/// Token response from the authorization server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Usually "Bearer".
    #[serde(default)]
    pub token_type: String,

    /// Declared lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Omitted on refresh when the provider does not rotate.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Granted scope, space-delimited. Omitted when unchanged.
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error body, e.g. `{"error":"invalid_grant","error_description":"..."}`.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

enum PostError {
    /// The provider rejected the grant itself.
    InvalidGrant(String),
    /// Network failure, unexpected status, or malformed body.
    Transport(String),
}

/// The token endpoint of the authorization server.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeem an authorization code under the PKCE verifier it committed to.
    async fn exchange_code(&self, code: &str, verifier: &str) -> AppResult<TokenResponse>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse>;
}

/// [`TokenEndpoint`] over HTTP.
pub struct HttpTokenEndpoint {
    client: Client,
    config: OAuthConfig,
}

impl HttpTokenEndpoint {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse, PostError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| PostError::Transport(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("token endpoint returned status {}: {}", status, body);
            if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(&body) {
                if oauth.error == "invalid_grant" {
                    let reason = oauth.error_description.unwrap_or(oauth.error);
                    return Err(PostError::InvalidGrant(reason));
                }
                return Err(PostError::Transport(format!(
                    "status {}: {}",
                    status, oauth.error
                )));
            }
            return Err(PostError::Transport(format!("status {}: {}", status, body)));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PostError::Transport(format!("malformed token response: {}", e)))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(&self, code: &str, verifier: &str) -> AppResult<TokenResponse> {
        debug!("exchanging authorization code");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];

        // A rejected code is a dead flow, not a dead session.
        self.post_form(&params).await.map_err(|e| match e {
            PostError::InvalidGrant(msg) | PostError::Transport(msg) => {
                AppError::TokenExchange(msg)
            }
        })
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        debug!("refreshing access token");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        self.post_form(&params).await.map_err(|e| match e {
            PostError::InvalidGrant(_) => AppError::SessionRevoked,
            PostError::Transport(msg) => AppError::RefreshFailed(msg),
        })
    }
}
