//! Session file holding OAuth credentials.
//!
//! The authorization server writes a credential record here when a flow
//! completes. The tool server, started separately, reads it back at boot.
//! The file is the only channel between the two processes.
//!
//! # Layout
//!
//! ```json
//! {
//!   "1760791234-9f86d081884c7d659a2feaa0c55ad015": {
//!     "token": "ya29...",
//!     "refresh_token": "1//0g...",
//!     "token_uri": "https://oauth2.googleapis.com/token",
//!     "client_id": "123.apps.googleusercontent.com",
//!     "client_secret": "GOCSPX-...",
//!     "scopes": ["https://www.googleapis.com/auth/calendar"],
//!     "expiry": "2026-10-18T13:00:00Z"
//!   }
//! }
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use gcal_bridge::credentials::{generate_session_id, CredentialStore};
//!
//! let store = CredentialStore::load("session.json");
//! for session_id in store.sessions() {
//!     if let Some(record) = store.get(&session_id) {
//!         println!("{} has {} scopes", session_id, record.scopes.len());
//!     }
//! }
//! # let _ = generate_session_id();
//! ```
//!
//! # Single active session
//!
//! [`CredentialStore::put`] replaces the whole table with a one-entry table.
//! Completing a new flow evicts every earlier session, and the tool server
//! relies on there being at most one entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

mod store;

pub use store::CredentialStore;


/// Token bundle obtained from a successful code exchange.
///
/// Records are never edited in place. A refresh produces a new record that
/// replaces the old one wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Short-lived bearer token for API calls
    #[serde(rename = "token")]
    pub access_token: String,

    /// Long-lived token for minting new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Provider token endpoint (used for refresh)
    #[serde(rename = "token_uri")]
    pub token_endpoint: String,

    pub client_id: String,

    pub client_secret: String,

    /// Granted permission strings
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the access token expires (UTC), if the provider said
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// True when the access token is expired or expires within `skew`.
    ///
    /// Records without a known expiry are treated as valid.
    pub fn expires_within(&self, skew: chrono::Duration) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + skew >= expiry,
            None => false,
        }
    }
}

/// Generate a new session ID: `<unix-seconds>-<32 hex chars>`.
///
/// The timestamp prefix keeps IDs roughly sortable by creation time; the
/// random suffix keeps two flows completing in the same second apart.
pub fn generate_session_id() -> String {
    let timestamp = Utc::now().timestamp();
    let random: [u8; 16] = rand::random();

    let mut id = String::with_capacity(20 + 1 + 32);
    let _ = write!(id, "{}-", timestamp);
    for byte in random {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}
