use anyhow::{Context, Result};
use gcal_bridge::api::{create_router, OAuthAppState};
use gcal_bridge::config::resolve_config;
use gcal_bridge::credentials::CredentialStore;
use gcal_bridge::oauth::{token_http_client, AuthorizationFlow, OAuthProviderConfig};
use gcal_bridge::state_codec::StateCodec;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcal_bridge=info".into()),
        )
        .init();

    info!("Google Calendar OAuth server starting...");

    let config_path = std::env::var("GCAL_BRIDGE_CONFIG").ok().map(PathBuf::from);
    let config = resolve_config(config_path.as_deref())?;

    let provider = OAuthProviderConfig::from_config(&config.oauth)
        .context("OAuth client is not configured")?;

    let codec = match &config.oauth.state_secret {
        Some(secret) => StateCodec::from_base64(secret).context("Invalid GCAL_BRIDGE_STATE_SECRET")?,
        None => {
            warn!("No state secret configured, using a random key for this process");
            StateCodec::random()
        }
    };

    let http = token_http_client(config.oauth.exchange_timeout_seconds)?;
    let secure_cookies = provider.redirect_uri.starts_with("https://");

    info!(
        redirect_uri = %provider.redirect_uri,
        session_file = %config.store.path.display(),
        scopes = provider.scopes.len(),
        "Configuration loaded"
    );

    let credential_store = Arc::new(CredentialStore::load(&config.store.path));
    let flow = Arc::new(AuthorizationFlow::new(provider, codec, http));

    let router = create_router(OAuthAppState {
        flow,
        credential_store,
        secure_cookies,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Open http://{}/oauth/ in a browser to authorize", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Authorization server error")?;

    info!("Server shut down");
    Ok(())
}
