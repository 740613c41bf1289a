//! OAuth provider configuration.
//!
//! Google endpoints plus the registered client, read from the
//! `client_secret.json` downloaded from the Google Cloud console and
//! optionally overridden by configuration.

use crate::config::OAuthConfig;
use crate::error::BridgeError;
use serde::Deserialize;
use std::path::Path;

/// Google OAuth authorization endpoint
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth provider configuration
#[derive(Clone, Debug)]
pub struct OAuthProviderConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Requested OAuth scopes
    pub scopes: Vec<String>,

    pub client_id: String,

    pub client_secret: String,

    /// Callback URL registered with the provider
    pub redirect_uri: String,
}

/// `client_secret.json` as downloaded from Google
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(alias = "installed")]
    web: ClientSecrets,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl OAuthProviderConfig {
    /// Build provider config from settings.
    ///
    /// `client_id`/`client_secret` in `config` take precedence; the secrets
    /// file is only read when one of them is missing.
    pub fn from_config(config: &OAuthConfig) -> Result<Self, BridgeError> {
        let mut provider = Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: config.scopes.clone(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: config.redirect_uri.clone(),
        };

        match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => {
                provider.client_id = id.clone();
                provider.client_secret = secret.clone();
            }
            (id, secret) => {
                let file = read_client_secrets(&config.client_secrets_file)?;
                provider.client_id = id.clone().unwrap_or(file.client_id);
                provider.client_secret = secret.clone().unwrap_or(file.client_secret);
                if let Some(auth_uri) = file.auth_uri {
                    provider.auth_url = auth_uri;
                }
                if let Some(token_uri) = file.token_uri {
                    provider.token_url = token_uri;
                }
            }
        }

        if provider.scopes.is_empty() {
            return Err(BridgeError::Config("at least one OAuth scope is required".to_string()));
        }

        Ok(provider)
    }

    /// Build authorization URL with state and the fixed offline/consent
    /// parameters (so a refresh token is always issued)
    pub fn build_auth_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&include_granted_scopes=true&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}

fn read_client_secrets(path: &Path) -> Result<ClientSecrets, BridgeError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!(
            "cannot read client secrets file {}: {} (set GCAL_BRIDGE_CLIENT_ID and GCAL_BRIDGE_CLIENT_SECRET instead)",
            path.display(),
            e
        ))
    })?;

    let file: ClientSecretsFile = serde_json::from_str(&contents).map_err(|e| {
        BridgeError::Config(format!("invalid client secrets file {}: {}", path.display(), e))
    })?;

    Ok(file.web)
}
