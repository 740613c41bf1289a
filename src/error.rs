//! Error taxonomy for the authorization flow, the session file and bootstrap.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Callback `state` is missing, malformed, or fails signature verification.
    #[error("invalid state parameter: {0}")]
    InvalidState(String),

    /// The token endpoint rejected the code (or refresh token), or could not be reached.
    #[error("token exchange failed: {message}")]
    TokenExchange { message: String, retryable: bool },

    /// Tool server started before any authorization flow completed.
    #[error("no active session: run the authorization flow first (GET /oauth/ on the authorization server)")]
    NoActiveSession,

    /// Writing the session file failed. In-memory state stays authoritative.
    #[error("failed to persist session file {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session file exists but could not be parsed.
    #[error("session file {path} is corrupt: {source}")]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn token_exchange(message: impl Into<String>, retryable: bool) -> Self {
        BridgeError::TokenExchange {
            message: message.into(),
            retryable,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::TokenExchange { retryable: true, .. })
    }
}
