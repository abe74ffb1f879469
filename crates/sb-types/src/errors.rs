//! Error types and conversions

use thiserror::Error;

/// Errors produced by the session lifecycle and the Web API client.
///
/// The enum is `Clone` so that a settled refresh outcome can be handed to
/// every caller waiting on the same in-flight operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("authorization flow cancelled")]
    FlowCancelled,

    #[error("authorization denied: {0}")]
    FlowDenied(String),

    #[error("authorization flow ended without a redirect")]
    RedirectMissing,

    #[error("no pending code verifier in storage")]
    MissingVerifier,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("session revoked by authorization server")]
    SessionRevoked,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("api error: {0}")]
    Api(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
