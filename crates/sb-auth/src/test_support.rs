//! Shared fixtures for the crate's tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sb_storage::StorageBackend;
use sb_types::{AppError, AppResult};

use crate::config::OAuthConfig;
use crate::endpoint::{TokenEndpoint, TokenResponse};
use crate::flow::AuthLauncher;
use crate::token::{write_token, Token};

pub fn test_config() -> OAuthConfig {
    OAuthConfig {
        client_id: "test-client".to_string(),
        authorize_url: "https://auth.example.com/authorize".to_string(),
        token_url: "https://auth.example.com/token".to_string(),
        redirect_uri: "https://songbar.example/cb".to_string(),
        scopes: vec![
            "user-read-playback-state".to_string(),
            "streaming".to_string(),
        ],
    }
}

pub fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        expires_in: Some(3600),
        refresh_token: refresh.map(str::to_string),
        scope: None,
    }
}

/// Token issued now; fresh for the next ~59 minutes.
pub fn fresh_token(access: &str, refresh: &str) -> Token {
    Token::from_response(response(access, Some(refresh)), None, None, Utc::now()).unwrap()
}

/// Token issued two hours ago; past both expiries.
pub fn stale_token(access: &str, refresh: &str) -> Token {
    let issued_at = Utc::now() - chrono::Duration::seconds(7200);
    Token::from_response(response(access, Some(refresh)), None, None, issued_at).unwrap()
}

/// Token past its safe expiry but not yet past the server-declared expiry.
pub fn buffered_token(access: &str, refresh: &str) -> Token {
    let issued_at = Utc::now() - chrono::Duration::seconds(3580);
    Token::from_response(response(access, Some(refresh)), None, None, issued_at).unwrap()
}

pub fn store_token(storage: &dyn StorageBackend, token: &Token) {
    write_token(storage, token).unwrap();
}

/// Scriptable [`TokenEndpoint`] that counts outward calls.
///
/// Pushed results are consumed front-to-back; with an empty queue the
/// endpoint answers with a default success (`A1`/`R1` for exchanges, `A2`
/// with no rotation for refreshes).
pub struct MockEndpoint {
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    exchange_results: Mutex<VecDeque<AppResult<TokenResponse>>>,
    refresh_results: Mutex<VecDeque<AppResult<TokenResponse>>>,
    last_exchange: Mutex<Option<(String, String)>>,
    delay: Mutex<Option<Duration>>,
}

impl MockEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            exchange_results: Mutex::new(VecDeque::new()),
            refresh_results: Mutex::new(VecDeque::new()),
            last_exchange: Mutex::new(None),
            delay: Mutex::new(None),
        })
    }

    pub fn push_exchange(&self, result: AppResult<TokenResponse>) {
        self.exchange_results.lock().push_back(result);
    }

    pub fn push_refresh(&self, result: AppResult<TokenResponse>) {
        self.refresh_results.lock().push_back(result);
    }

    /// Hold every response for `delay`, keeping a flight open long enough
    /// for concurrent callers to pile up.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn exchange_count(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Code and verifier of the most recent exchange.
    pub fn last_exchange(&self) -> Option<(String, String)> {
        self.last_exchange.lock().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TokenEndpoint for MockEndpoint {
    async fn exchange_code(&self, code: &str, verifier: &str) -> AppResult<TokenResponse> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_exchange.lock() = Some((code.to_string(), verifier.to_string()));
        self.pause().await;
        self.exchange_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(response("A1", Some("R1"))))
    }

    async fn refresh(&self, _refresh_token: &str) -> AppResult<TokenResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.refresh_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(response("A2", None)))
    }
}

/// [`AuthLauncher`] that replays a scripted redirect.
pub struct MockLauncher {
    result: AppResult<String>,
    pub seen_url: Mutex<Option<String>>,
}

impl MockLauncher {
    pub fn redirecting(redirect: &str) -> Self {
        Self {
            result: Ok(redirect.to_string()),
            seen_url: Mutex::new(None),
        }
    }

    pub fn failing(error: AppError) -> Self {
        Self {
            result: Err(error),
            seen_url: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AuthLauncher for MockLauncher {
    async fn launch(&self, url: &str) -> AppResult<String> {
        *self.seen_url.lock() = Some(url.to_string());
        self.result.clone()
    }
}
