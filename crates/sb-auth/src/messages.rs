//! Login/logout messages exchanged with the UI
//!
//! UI contexts send a [`SessionRequest`] over the extension message bus and
//! await the matching [`SessionResponse`]. Failures are folded into the
//! reply so the bus never carries a transport-level error.

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::session::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCommand {
    Login,
    Logout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub id: Uuid,
    pub command: SessionCommand,
}

impl SessionRequest {
    pub fn new(command: SessionCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionReply {
    LoggedIn { authenticated: bool },
    LoggedOut,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub reply: SessionReply,
}

/// Dispatch a UI session request.
pub async fn handle_request(manager: &SessionManager, request: SessionRequest) -> SessionResponse {
    let reply = match request.command {
        SessionCommand::Login => match manager.authenticate().await {
            Ok(outcome) => SessionReply::LoggedIn {
                authenticated: outcome.authenticated,
            },
            Err(err) => {
                warn!("login failed: {}", err);
                SessionReply::Failed {
                    message: err.into(),
                }
            }
        },
        SessionCommand::Logout => match manager.clear_session() {
            Ok(()) => SessionReply::LoggedOut,
            Err(err) => SessionReply::Failed {
                message: err.into(),
            },
        },
    };

    SessionResponse {
        id: request.id,
        reply,
    }
}
