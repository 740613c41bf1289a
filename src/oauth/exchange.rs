//! OAuth token endpoint calls.
//!
//! Handles exchanging authorization codes for tokens and refreshing
//! expired access tokens.

use super::provider::OAuthProviderConfig;
use crate::credentials::CredentialRecord;
use crate::error::BridgeError;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-separated granted scopes
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// OAuth error body (RFC 6749 section 5.2)
#[derive(Deserialize, Debug)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for token endpoint calls with a request timeout.
pub fn token_http_client(timeout_seconds: u64) -> Result<reqwest::Client, BridgeError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Exchange authorization code for a credential record
///
/// # Returns
/// * `Ok(CredentialRecord)` - Tokens plus the client identity needed to refresh later
/// * `Err(BridgeError::TokenExchange)` - Provider rejected the code or could not be reached
pub async fn exchange_code_for_token(
    client: &reqwest::Client,
    provider: &OAuthProviderConfig,
    code: &str,
) -> Result<CredentialRecord, BridgeError> {
    let mut form_data = HashMap::new();
    form_data.insert("grant_type", "authorization_code");
    form_data.insert("code", code);
    form_data.insert("redirect_uri", provider.redirect_uri.as_str());
    form_data.insert("client_id", provider.client_id.as_str());
    form_data.insert("client_secret", provider.client_secret.as_str());

    tracing::debug!("Exchanging authorization code for token at {}", provider.token_url);

    let token_response = post_token_request(client, &provider.token_url, &form_data).await?;

    tracing::debug!(
        "Token exchange successful, has_refresh_token={}, expires_in={:?}",
        token_response.refresh_token.is_some(),
        token_response.expires_in
    );

    let scopes = granted_scopes(token_response.scope.as_deref(), &provider.scopes);

    Ok(CredentialRecord {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token,
        token_endpoint: provider.token_url.clone(),
        client_id: provider.client_id.clone(),
        client_secret: provider.client_secret.clone(),
        scopes,
        expiry: expiry_from(token_response.expires_in),
    })
}

/// Mint a new access token from the record's refresh token.
///
/// Returns a complete replacement record. The provider usually omits the
/// refresh token on refresh, in which case the old one is kept.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    record: &CredentialRecord,
) -> Result<CredentialRecord, BridgeError> {
    let refresh_token = record.refresh_token.as_deref().ok_or_else(|| {
        BridgeError::token_exchange(
            "no refresh token stored for this session; run the authorization flow again",
            false,
        )
    })?;

    let mut form_data = HashMap::new();
    form_data.insert("grant_type", "refresh_token");
    form_data.insert("refresh_token", refresh_token);
    form_data.insert("client_id", record.client_id.as_str());
    form_data.insert("client_secret", record.client_secret.as_str());

    tracing::debug!("Refreshing access token at {}", record.token_endpoint);

    let token_response = post_token_request(client, &record.token_endpoint, &form_data).await?;

    Ok(CredentialRecord {
        access_token: token_response.access_token,
        refresh_token: token_response
            .refresh_token
            .or_else(|| record.refresh_token.clone()),
        token_endpoint: record.token_endpoint.clone(),
        client_id: record.client_id.clone(),
        client_secret: record.client_secret.clone(),
        scopes: granted_scopes(token_response.scope.as_deref(), &record.scopes),
        expiry: expiry_from(token_response.expires_in),
    })
}

async fn post_token_request(
    client: &reqwest::Client,
    token_url: &str,
    form_data: &HashMap<&str, &str>,
) -> Result<TokenResponse, BridgeError> {
    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form_data)
        .send()
        .await
        .map_err(|e| {
            let kind = if e.is_timeout() { "timed out" } else { "failed" };
            BridgeError::token_exchange(format!("token endpoint request {}: {}", kind, e), true)
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(BridgeError::token_exchange(
            format!("token endpoint returned {}: {}", status, describe_error_body(&body)),
            is_retryable_status(status),
        ));
    }

    response.json::<TokenResponse>().await.map_err(|e| {
        BridgeError::token_exchange(format!("failed to parse token response: {}", e), false)
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{} ({})", err.error, description),
            None => err.error,
        },
        Err(_) => body.to_string(),
    }
}

fn granted_scopes(granted: Option<&str>, requested: &[String]) -> Vec<String> {
    match granted {
        Some(scope) if !scope.trim().is_empty() => {
            scope.split_whitespace().map(|s| s.to_string()).collect()
        }
        _ => requested.to_vec(),
    }
}

/// Absolute expiry from `expires_in`. Out-of-range values are treated as
/// unknown.
fn expiry_from(expires_in: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    let lifetime = Duration::try_seconds(expires_in?)?;
    let expiry = Utc::now().checked_add_signed(lifetime);
    if expiry.is_none() {
        tracing::warn!(expires_in = ?expires_in, "Ignoring out-of-range token lifetime");
    }
    expiry
}
