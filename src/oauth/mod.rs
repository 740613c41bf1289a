//! OAuth 2.0 authorization code flow against Google.
//!
//! 1. `begin` builds the provider URL carrying the signed flow state
//! 2. User consents on Google's page
//! 3. Google redirects back with `code` and `state`
//! 4. `complete` verifies the state and exchanges the code for a credential
//!
//! Codes are single-use on the provider side, so a repeated `complete` with
//! the same code fails at the token endpoint with `TokenExchange`.

mod exchange;
mod provider;

pub use exchange::{exchange_code_for_token, refresh_access_token, token_http_client};
pub use provider::{OAuthProviderConfig, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};

use crate::credentials::CredentialRecord;
use crate::error::BridgeError;
use crate::state_codec::{FlowState, StateCodec};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the controller is in the redirect round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowPhase {
    NotStarted,
    AwaitingCallback,
    Completed,
}

/// Drives the authorization code flow for a single operator.
pub struct AuthorizationFlow {
    provider: OAuthProviderConfig,
    codec: StateCodec,
    http: reqwest::Client,
    phase: Mutex<FlowPhase>,
}

impl AuthorizationFlow {
    pub fn new(provider: OAuthProviderConfig, codec: StateCodec, http: reqwest::Client) -> Self {
        Self {
            provider,
            codec,
            http,
            phase: Mutex::new(FlowPhase::NotStarted),
        }
    }

    pub fn provider(&self) -> &OAuthProviderConfig {
        &self.provider
    }

    pub fn phase(&self) -> FlowPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build the provider authorization URL for a new attempt.
    pub fn begin(&self, flow_state: &FlowState) -> String {
        let state = self.codec.encode(flow_state);
        let url = self.provider.build_auth_url(&state);

        self.set_phase(FlowPhase::AwaitingCallback);
        debug!(keys = flow_state.len(), "Authorization flow started");

        url
    }

    /// Verify the callback state and exchange the code.
    ///
    /// # Returns
    /// * `Ok((record, flow_state))` - New credential and the original flow state
    /// * `Err(BridgeError::InvalidState)` - State tampered or signed with another key; provider not contacted
    /// * `Err(BridgeError::TokenExchange)` - Provider rejected the code or was unreachable
    pub async fn complete(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(CredentialRecord, FlowState), BridgeError> {
        let flow_state = self.codec.decode(state)?;

        match self.phase() {
            FlowPhase::NotStarted => {
                warn!("Callback received without a flow started by this process");
            }
            FlowPhase::Completed => {
                debug!("Callback received after a completed flow");
            }
            FlowPhase::AwaitingCallback => {}
        }

        let record = exchange_code_for_token(&self.http, &self.provider, code).await?;

        self.set_phase(FlowPhase::Completed);
        info!(
            has_refresh_token = record.refresh_token.is_some(),
            scopes = record.scopes.len(),
            "Authorization code exchanged"
        );

        Ok((record, flow_state))
    }

    fn set_phase(&self, phase: FlowPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }
}
