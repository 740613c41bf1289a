use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "GCAL_BRIDGE_";

/// Scopes requested when none are configured
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.settings.readonly",
];

/// Complete bridge configuration (shared by both binaries)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

/// Authorization server listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// OAuth client registration and flow settings
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Google client secrets JSON (`{"web": {...}}` or `{"installed": {...}}`)
    #[serde(default = "default_client_secrets_file")]
    pub client_secrets_file: PathBuf,
    /// Overrides the client ID from the secrets file
    #[serde(default)]
    pub client_id: Option<String>,
    /// Overrides the client secret from the secrets file
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Base64 key for signing flow state. Random per process when unset.
    #[serde(default)]
    pub state_secret: Option<String>,
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_seconds: u64,
}

fn default_client_secrets_file() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_redirect_uri() -> String {
    "http://localhost:8000/oauth/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_exchange_timeout() -> u64 {
    10
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_secrets_file: default_client_secrets_file(),
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            state_secret: None,
            exchange_timeout_seconds: default_exchange_timeout(),
        }
    }
}

/// Session file shared between the two processes
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("session.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Tool server settings
#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_mcp_port")]
    pub port: u16,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_mcp_port() -> u16 {
    8080
}

fn default_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_mcp_port(),
            api_base: default_api_base(),
        }
    }
}

impl BridgeConfig {
    /// Apply `GCAL_BRIDGE_*` environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(v) = lookup("CLIENT_SECRETS_FILE") {
            self.oauth.client_secrets_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = lookup("CLIENT_SECRET") {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = lookup("REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = lookup("SCOPES") {
            let scopes: Vec<String> = v
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            if !scopes.is_empty() {
                self.oauth.scopes = scopes;
            }
        }
        if let Some(v) = lookup("STATE_SECRET") {
            self.oauth.state_secret = Some(v);
        }
        if let Some(secs) = lookup("EXCHANGE_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.oauth.exchange_timeout_seconds = secs;
        }
        if let Some(v) = lookup("SESSION_FILE") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MCP_HOST") {
            self.mcp.host = v;
        }
        if let Some(port) = lookup("MCP_PORT").and_then(|v| v.parse().ok()) {
            self.mcp.port = port;
        }
        if let Some(v) = lookup("API_BASE") {
            self.mcp.api_base = v;
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    use anyhow::Context;

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BridgeConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load from `path` if given (defaults otherwise), then apply env overrides.
pub fn resolve_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env();
    Ok(config)
}
