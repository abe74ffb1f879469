//! OAuth endpoint configuration

use serde::{Deserialize, Serialize};

const SPOTIFY_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Endpoints and client identity for the authorization-code flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Extension-specific callback the provider redirects to after consent.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Configuration against the production Spotify accounts service, with
    /// the scopes the extension needs for playback control and lyrics sync.
    pub fn spotify(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorize_url: SPOTIFY_AUTHORIZE_URL.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![
                "user-read-playback-state".to_string(),
                "user-modify-playback-state".to_string(),
                "user-read-currently-playing".to_string(),
                "streaming".to_string(),
            ],
        }
    }

    /// Space-joined scope list, as sent on the wire.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
