//! Session facade
//!
//! The public surface the rest of the extension calls: current access token,
//! interactive login, logout, and the memoized Web API client. Wires the
//! refresh coordinator to storage change notifications so a token written by
//! another execution context reschedules the local proactive timer.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use sb_spotify::SpotifyClient;
use sb_storage::{StorageBackend, StorageChange};
use sb_types::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::endpoint::TokenEndpoint;
use crate::flow::{AuthFlow, AuthLauncher};
use crate::refresh::RefreshCoordinator;
use crate::token::{self, Token};

/// Result of an interactive login reported back to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub authenticated: bool,
}

/// Process-wide session manager.
///
/// Constructed once per process via [`SessionManager::start`] and shared by
/// reference. In-memory state (the memoized client, the armed timer, the
/// in-flight refresh) is process-local; the persisted token in storage is the
/// only state shared with other execution contexts.
pub struct SessionManager {
    storage: Arc<dyn StorageBackend>,
    flow: AuthFlow,
    coordinator: RefreshCoordinator,
    launcher: Arc<dyn AuthLauncher>,
    /// Memoized Web API client, bound to the access token it was built with.
    client: Mutex<Option<SpotifyClient>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Construct the session manager and start listening for cross-context
    /// storage changes.
    pub fn start(
        config: OAuthConfig,
        storage: Arc<dyn StorageBackend>,
        endpoint: Arc<dyn TokenEndpoint>,
        launcher: Arc<dyn AuthLauncher>,
    ) -> Arc<Self> {
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&storage), Arc::clone(&endpoint));
        let flow = AuthFlow::new(config, Arc::clone(&storage), endpoint);

        let manager = Arc::new(Self {
            storage,
            flow,
            coordinator,
            launcher,
            client: Mutex::new(None),
            listener: Mutex::new(None),
        });

        // The listener holds a weak reference so dropping the last strong
        // handle shuts it down.
        let weak = Arc::downgrade(&manager);
        let mut events = manager.storage.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.on_storage_change(change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("storage listener lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *manager.listener.lock() = Some(handle);

        manager
    }

    /// Current access token, refreshing if it is past the safe expiry.
    ///
    /// Never errors: an unrecoverable session is reported as `None` so read
    /// paths degrade to logged-out instead of crashing callers.
    pub async fn access_token(&self) -> Option<Token> {
        let stored = match token::read_token(self.storage.as_ref()) {
            Ok(stored) => stored,
            Err(err) => {
                warn!("could not read session token: {}", err);
                return None;
            }
        };
        let stored = stored?;

        if stored.is_fresh(Utc::now()) {
            // Timers do not survive host suspension; re-arm on every read.
            self.coordinator.schedule_refresh(&stored);
            return Some(stored);
        }

        match self.coordinator.refresh(&stored.refresh_token).await {
            Ok(token) => Some(token),
            Err(AppError::SessionRevoked) => {
                info!("session revoked, clearing local state");
                if let Err(err) = self.clear_session() {
                    warn!("failed to clear revoked session: {}", err);
                }
                None
            }
            Err(err) => {
                warn!("token refresh failed, treating session as signed out: {}", err);
                None
            }
        }
    }

    /// Run the full interactive login: consent popup, code exchange,
    /// proactive scheduling.
    ///
    /// Errors propagate to the caller; a failed flow persists nothing.
    pub async fn authenticate(&self) -> AppResult<AuthOutcome> {
        let auth_url = self.flow.build_authorization_url()?;
        let code = self
            .flow
            .run_interactive(self.launcher.as_ref(), &auth_url)
            .await?;
        let token = self.flow.exchange_code(&code).await?;

        self.coordinator.schedule_refresh(&token);
        // Any memoized client is bound to the previous session's token.
        *self.client.lock() = None;

        info!("interactive login complete");
        Ok(AuthOutcome {
            authenticated: token.is_fresh(Utc::now()),
        })
    }

    /// Tear down the session. Safe to call repeatedly.
    pub fn clear_session(&self) -> AppResult<()> {
        self.coordinator.cancel_scheduled();
        *self.client.lock() = None;
        self.storage.remove(token::TOKEN_KEY)?;
        info!("session cleared");
        Ok(())
    }

    /// Web API client bound to the current access token.
    ///
    /// The client captures its token at construction, so a refresh or logout
    /// invalidates the memoized instance and a new one is built on demand.
    pub async fn client(&self) -> Option<SpotifyClient> {
        let token = self.access_token().await?;

        let mut cached = self.client.lock();
        match cached.as_ref() {
            Some(client) if client.access_token() == token.access_token => Some(client.clone()),
            _ => {
                let client = SpotifyClient::new(token.access_token);
                *cached = Some(client.clone());
                Some(client)
            }
        }
    }

    /// One reschedule code path for every trigger source: local refreshes
    /// arrive here through the same notifications as cross-context writes.
    fn on_storage_change(&self, change: StorageChange) {
        if change.key != token::TOKEN_KEY {
            return;
        }

        match change.new_value {
            Some(raw) => match serde_json::from_str::<Token>(&raw) {
                Ok(token) => {
                    debug!("session token updated in storage, rescheduling refresh");
                    self.coordinator.schedule_refresh(&token);
                }
                Err(err) => {
                    warn!("ignoring unparseable session token from storage: {}", err);
                }
            },
            None => {
                debug!("session token removed from storage");
                self.coordinator.cancel_scheduled();
                *self.client.lock() = None;
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.coordinator.cancel_scheduled();
    }
}
