//! The persisted session token

use chrono::{DateTime, Duration, Utc};
use sb_storage::StorageBackend;
use sb_types::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::endpoint::TokenResponse;

/// Storage key for the persisted session token.
pub const TOKEN_KEY: &str = "songbar/session_token";

/// Safety margin subtracted from the server-declared expiry. A token inside
/// this window is treated as expired so a request started just before the
/// hard expiry cannot race a server-side rejection.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Fallback lifetime when the server omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// An issued access/refresh token pair with its expiry instants.
///
/// Tokens are persisted wholesale and superseded, never mutated in place.
/// The durable copy in storage is authoritative; any instance held in memory
/// is advisory and re-validated against storage before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    /// `expires_at` minus the safety buffer; the token counts as expired
    /// from this instant on.
    pub safe_expires_at: DateTime<Utc>,
}

impl Token {
    /// Build a token from a wire response.
    ///
    /// `previous_refresh_token` and `previous_scope` are carried forward
    /// when the response omits them; providers may or may not rotate the
    /// refresh token on renewal.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
        previous_scope: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let refresh_token = response
            .refresh_token
            .or(previous_refresh_token)
            .ok_or_else(|| {
                AppError::TokenExchange("token response carried no refresh token".to_string())
            })?;

        let lifetime = response.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS);
        let expires_at = issued_at + Duration::seconds(lifetime);

        Ok(Self {
            access_token: response.access_token,
            refresh_token,
            scope: response.scope.or(previous_scope),
            token_type: response.token_type,
            expires_at,
            safe_expires_at: expires_at - Duration::seconds(EXPIRY_BUFFER_SECS),
        })
    }

    /// Whether the token can still be used without a refresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.safe_expires_at
    }
}

/// Read the persisted session token, if any.
pub fn read_token(storage: &dyn StorageBackend) -> AppResult<Option<Token>> {
    match storage.read(TOKEN_KEY)? {
        Some(raw) => {
            let token = serde_json::from_str(&raw)
                .map_err(|e| AppError::Storage(format!("corrupt session token: {}", e)))?;
            Ok(Some(token))
        }
        None => Ok(None),
    }
}

/// Persist `token`, replacing any previous value wholesale.
pub fn write_token(storage: &dyn StorageBackend, token: &Token) -> AppResult<()> {
    let raw = serde_json::to_string(token)
        .map_err(|e| AppError::Storage(format!("serialize session token: {}", e)))?;
    storage.write(TOKEN_KEY, &raw)
}
