//! Authorization flow driver
//!
//! Builds the consent URL, drives the interactive popup, and exchanges the
//! returned code for the first session token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sb_storage::StorageBackend;
use sb_types::{AppError, AppResult};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OAuthConfig;
use crate::endpoint::TokenEndpoint;
use crate::pkce::PkcePair;
use crate::token::{self, Token};

/// Storage key for the pending PKCE verifier.
pub const VERIFIER_KEY: &str = "songbar/pkce_verifier";

/// The platform's interactive web-auth surface.
///
/// Production launches the extension's consent popup and resolves with the
/// full redirect URL once the provider navigates back. Implementations fail
/// with [`AppError::FlowCancelled`] when the user closes the popup without
/// completing the flow.
#[async_trait]
pub trait AuthLauncher: Send + Sync {
    async fn launch(&self, url: &str) -> AppResult<String>;
}

/// Drives one authorization-code round-trip.
pub struct AuthFlow {
    config: OAuthConfig,
    storage: Arc<dyn StorageBackend>,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl AuthFlow {
    pub fn new(
        config: OAuthConfig,
        storage: Arc<dyn StorageBackend>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            config,
            storage,
            endpoint,
        }
    }

    /// Build the authorization URL and persist the verifier it commits to.
    ///
    /// Overwrites any verifier left behind by an abandoned attempt, so only
    /// the most recent flow can complete.
    pub fn build_authorization_url(&self) -> AppResult<String> {
        let pkce = PkcePair::generate();
        self.storage.write(VERIFIER_KEY, &pkce.verifier)?;

        let mut url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&code_challenge={}&code_challenge_method={}",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&pkce.challenge),
            pkce.method,
        );

        if !self.config.scopes.is_empty() {
            url.push_str(&format!(
                "&scope={}",
                urlencoding::encode(&self.config.scope_string())
            ));
        }

        debug!("built authorization URL");
        Ok(url)
    }

    /// Run the interactive consent flow and return the authorization code.
    pub async fn run_interactive(
        &self,
        launcher: &dyn AuthLauncher,
        auth_url: &str,
    ) -> AppResult<String> {
        let redirect = launcher.launch(auth_url).await?;
        parse_redirect(&redirect)
    }

    /// Exchange an authorization code for the first session token.
    ///
    /// The stored verifier is removed whether or not the exchange succeeds;
    /// a code can only ever be redeemed against one verifier. A failed
    /// exchange never persists a token.
    pub async fn exchange_code(&self, code: &str) -> AppResult<Token> {
        let verifier = self
            .storage
            .read(VERIFIER_KEY)?
            .ok_or(AppError::MissingVerifier)?;

        let result = self.endpoint.exchange_code(code, &verifier).await;
        self.storage.remove(VERIFIER_KEY)?;

        let response = result?;
        let token = Token::from_response(response, None, None, Utc::now())?;
        token::write_token(self.storage.as_ref(), &token)?;

        info!("authorization code exchanged, session established");
        Ok(token)
    }
}

/// Extract the authorization code from a redirect URL.
fn parse_redirect(redirect: &str) -> AppResult<String> {
    if redirect.is_empty() {
        return Err(AppError::RedirectMissing);
    }

    let url = Url::parse(redirect).map_err(|_| AppError::RedirectMissing)?;

    if let Some((_, error)) = url.query_pairs().find(|(k, _)| k == "error") {
        warn!("authorization denied: {}", error);
        return Err(AppError::FlowDenied(error.into_owned()));
    }

    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or(AppError::RedirectMissing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{response, test_config, MockEndpoint, MockLauncher};
    use crate::token::{read_token, EXPIRY_BUFFER_SECS, TOKEN_KEY};
    use chrono::Duration;
    use sb_storage::MemoryStorage;

    fn test_flow(
        storage: Arc<MemoryStorage>,
        endpoint: Arc<MockEndpoint>,
    ) -> AuthFlow {
        AuthFlow::new(test_config(), storage, endpoint)
    }

    #[test]
    fn test_build_authorization_url() {
        let storage = Arc::new(MemoryStorage::new());
        let flow = test_flow(Arc::clone(&storage), MockEndpoint::new());

        let url = flow.build_authorization_url().unwrap();

        assert!(url.starts_with("https://auth.example.com/authorize?"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=user-read-playback-state%20streaming"));

        // The verifier behind the URL's challenge is persisted for the
        // exchange step.
        assert!(storage.read(VERIFIER_KEY).unwrap().is_some());
    }

    #[test]
    fn test_build_url_overwrites_stale_verifier() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(VERIFIER_KEY, "stale").unwrap();
        let flow = test_flow(Arc::clone(&storage), MockEndpoint::new());

        flow.build_authorization_url().unwrap();

        let verifier = storage.read(VERIFIER_KEY).unwrap().unwrap();
        assert_ne!(verifier, "stale");
    }

    #[test]
    fn test_parse_redirect_with_code() {
        let code = parse_redirect("https://songbar.example/cb?code=abc&state=x").unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn test_parse_redirect_with_error() {
        let result = parse_redirect("https://songbar.example/cb?error=access_denied");
        assert_eq!(result, Err(AppError::FlowDenied("access_denied".to_string())));
    }

    #[test]
    fn test_parse_redirect_without_code() {
        let result = parse_redirect("https://songbar.example/cb");
        assert_eq!(result, Err(AppError::RedirectMissing));
    }

    #[test]
    fn test_parse_redirect_garbled() {
        assert_eq!(parse_redirect("not a url"), Err(AppError::RedirectMissing));
        assert_eq!(parse_redirect(""), Err(AppError::RedirectMissing));
    }

    #[tokio::test]
    async fn test_run_interactive_returns_code() {
        let storage = Arc::new(MemoryStorage::new());
        let flow = test_flow(storage, MockEndpoint::new());
        let launcher = MockLauncher::redirecting("https://songbar.example/cb?code=abc");

        let code = flow.run_interactive(&launcher, "https://auth").await.unwrap();
        assert_eq!(code, "abc");
        assert_eq!(
            launcher.seen_url.lock().as_deref(),
            Some("https://auth")
        );
    }

    #[tokio::test]
    async fn test_run_interactive_cancelled() {
        let storage = Arc::new(MemoryStorage::new());
        let flow = test_flow(storage, MockEndpoint::new());
        let launcher = MockLauncher::failing(AppError::FlowCancelled);

        let result = flow.run_interactive(&launcher, "https://auth").await;
        assert_eq!(result, Err(AppError::FlowCancelled));
    }

    #[tokio::test]
    async fn test_exchange_code_persists_token() {
        let storage = Arc::new(MemoryStorage::new());
        let endpoint = MockEndpoint::new();
        endpoint.push_exchange(Ok(response("A1", Some("R1"))));
        let flow = test_flow(Arc::clone(&storage), Arc::clone(&endpoint));

        flow.build_authorization_url().unwrap();
        let before = Utc::now();
        let token = flow.exchange_code("abc").await.unwrap();

        assert_eq!(token.access_token, "A1");
        assert_eq!(token.refresh_token, "R1");
        assert!(token.expires_at >= before + Duration::seconds(3600));
        assert_eq!(
            token.safe_expires_at,
            token.expires_at - Duration::seconds(EXPIRY_BUFFER_SECS)
        );

        // The exchange posted the verifier that was persisted by
        // build_authorization_url.
        let (_, verifier) = endpoint.last_exchange().unwrap();
        assert_eq!(verifier.len(), 64);

        assert_eq!(read_token(storage.as_ref()).unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_exchange_consumes_verifier() {
        let storage = Arc::new(MemoryStorage::new());
        let endpoint = MockEndpoint::new();
        endpoint.push_exchange(Ok(response("A1", Some("R1"))));
        let flow = test_flow(Arc::clone(&storage), endpoint);

        flow.build_authorization_url().unwrap();
        flow.exchange_code("abc").await.unwrap();

        assert_eq!(storage.read(VERIFIER_KEY).unwrap(), None);

        // Replaying the code fails: the verifier is single-use.
        let result = flow.exchange_code("abc").await;
        assert_eq!(result, Err(AppError::MissingVerifier));
    }

    #[tokio::test]
    async fn test_failed_exchange_persists_nothing() {
        let storage = Arc::new(MemoryStorage::new());
        let endpoint = MockEndpoint::new();
        endpoint.push_exchange(Err(AppError::TokenExchange("status 400".to_string())));
        let flow = test_flow(Arc::clone(&storage), endpoint);

        flow.build_authorization_url().unwrap();
        let result = flow.exchange_code("abc").await;

        assert!(matches!(result, Err(AppError::TokenExchange(_))));
        assert_eq!(storage.read(TOKEN_KEY).unwrap(), None);
        // The verifier is consumed on failure too.
        assert_eq!(storage.read(VERIFIER_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_exchange_posts_stored_verifier() {
        let storage = Arc::new(MemoryStorage::new());
        let endpoint = MockEndpoint::new();
        storage.write(VERIFIER_KEY, "v1").unwrap();
        let flow = test_flow(storage, Arc::clone(&endpoint));

        flow.exchange_code("abc").await.unwrap();

        assert_eq!(
            endpoint.last_exchange(),
            Some(("abc".to_string(), "v1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_exchange_without_verifier() {
        let storage = Arc::new(MemoryStorage::new());
        let flow = test_flow(storage, MockEndpoint::new());

        let result = flow.exchange_code("abc").await;
        assert_eq!(result, Err(AppError::MissingVerifier));
    }
}
