//! Tool server side of the session handoff.
//!
//! At startup the tool server picks the session written by the
//! authorization server ([`select_active_session`]) and wraps it in
//! [`SessionCredentials`], which hands out access tokens and refreshes them
//! through the stored refresh token when they expire.

use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::BridgeError;
use crate::oauth::refresh_access_token;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};


/// Refresh this long before the provider's stated expiry
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// The session chosen at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: String,
    pub record: CredentialRecord,
}

/// Pick the session to serve with.
///
/// The store holds at most one entry under the single-active-session
/// policy. If a hand-edited file holds several, the newest ID wins.
pub fn select_active_session(store: &CredentialStore) -> Result<ActiveSession, BridgeError> {
    let sessions = store.sessions();

    let session_id = sessions.last().ok_or(BridgeError::NoActiveSession)?;
    if sessions.len() > 1 {
        warn!(
            sessions = sessions.len(),
            selected = %session_id,
            "Session file holds more than one session, using the newest"
        );
    }

    let record = store.get(session_id).ok_or(BridgeError::NoActiveSession)?;

    info!(session_id = %session_id, "Active session selected");
    Ok(ActiveSession {
        session_id: session_id.clone(),
        record,
    })
}

/// Access token source for the calendar client.
///
/// Refreshes are serialised: concurrent callers that all see an expired
/// token wait for a single refresh.
pub struct SessionCredentials {
    session_id: String,
    record: Mutex<CredentialRecord>,
    store: Arc<CredentialStore>,
    http: reqwest::Client,
}

impl SessionCredentials {
    pub fn new(active: ActiveSession, store: Arc<CredentialStore>, http: reqwest::Client) -> Self {
        Self {
            session_id: active.session_id,
            record: Mutex::new(active.record),
            store,
            http,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current record (after any refreshes).
    pub async fn record(&self) -> CredentialRecord {
        self.record.lock().await.clone()
    }

    /// A usable access token, refreshing first if the current one is about
    /// to expire.
    pub async fn access_token(&self) -> Result<String, BridgeError> {
        let mut record = self.record.lock().await;

        if record.expires_within(Duration::seconds(EXPIRY_SKEW_SECONDS)) {
            info!(session_id = %self.session_id, "Access token expired or expiring, refreshing");
            let renewed = self.refresh_locked(&record).await?;
            *record = renewed;
        }

        Ok(record.access_token.clone())
    }

    /// Refresh after the API rejected `rejected_token`.
    ///
    /// If another caller already replaced that token, the newer one is
    /// returned without a second refresh.
    pub async fn force_refresh(&self, rejected_token: &str) -> Result<String, BridgeError> {
        let mut record = self.record.lock().await;

        if record.access_token != rejected_token {
            return Ok(record.access_token.clone());
        }

        info!(session_id = %self.session_id, "Access token rejected, refreshing");
        let renewed = self.refresh_locked(&record).await?;
        *record = renewed;
        Ok(record.access_token.clone())
    }

    async fn refresh_locked(&self, current: &CredentialRecord) -> Result<CredentialRecord, BridgeError> {
        let renewed = refresh_access_token(&self.http, current).await?;

        // The auth server may have replaced this session since boot
        match self.store.update_if_current(&self.session_id, renewed.clone()) {
            Ok(true) => {}
            Ok(false) => info!(session_id = %self.session_id, "Refreshed token not written back"),
            Err(e) => warn!(error = %e, "Refreshed token kept in memory only"),
        }
        Ok(renewed)
    }
}
