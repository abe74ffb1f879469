//! Thin Spotify Web API client
//!
//! The client binds its bearer token at construction time and cannot be
//! re-pointed at a newer token. When the session refreshes or is cleared,
//! the session manager drops the memoized instance and builds a fresh one on
//! the next access.

use sb_types::{AppError, AppResult};
use tracing::debug;

/// Spotify Web API base URL.
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Web API client bound to a single access token.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, API_BASE_URL)
    }

    /// Client against a non-default base URL (tests, proxies).
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            base_url: base_url.into(),
        }
    }

    /// The access token this client was constructed with.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Issue an authorized GET against the Web API and decode the JSON body.
    pub async fn get_json(&self, path: &str) -> AppResult<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Api(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Api(format!(
                "{} returned status {}",
                path, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Api(format!("malformed response body: {}", e)))
    }
}
