//! OAuth session lifecycle for Songbar
//!
//! Implements the authorization-code flow with PKCE (S256) against the
//! Spotify accounts service and owns the resulting session token:
//! - PKCE pair generation
//! - Authorization URL construction and interactive consent flow
//! - Code exchange and token persistence
//! - Proactive, single-flight token refresh with revocation teardown
//! - The session facade the rest of the extension calls
//!
//! # Usage Example
//! ```no_run
//! use std::sync::Arc;
//! use sb_auth::{HttpTokenEndpoint, OAuthConfig, SessionManager};
//! use sb_storage::MemoryStorage;
//!
//! # async fn run(launcher: Arc<dyn sb_auth::AuthLauncher>) {
//! let config = OAuthConfig::spotify("client-id", "https://songbar.example/callback");
//! let endpoint = Arc::new(HttpTokenEndpoint::new(config.clone()));
//! let storage = Arc::new(MemoryStorage::new());
//! let session = SessionManager::start(config, storage, endpoint, launcher);
//!
//! if session.access_token().await.is_none() {
//!     session.authenticate().await.ok();
//! }
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod flow;
pub mod messages;
pub mod pkce;
pub mod refresh;
pub mod session;
pub mod token;

#[cfg(test)]
mod test_support;

pub use config::OAuthConfig;
pub use endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenResponse};
pub use flow::{AuthFlow, AuthLauncher, VERIFIER_KEY};
pub use messages::{handle_request, SessionCommand, SessionReply, SessionRequest, SessionResponse};
pub use pkce::PkcePair;
pub use refresh::RefreshCoordinator;
pub use session::{AuthOutcome, SessionManager};
pub use token::{Token, EXPIRY_BUFFER_SECS, TOKEN_KEY};
