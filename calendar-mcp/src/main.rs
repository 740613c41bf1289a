use anyhow::{Context, Result};
use calendar_mcp::client::CalendarClient;
use calendar_mcp::server::{serve_http, serve_stdio, McpServer};
use calendar_mcp::tools::ToolRegistry;
use clap::{Parser, ValueEnum};
use gcal_bridge::config::resolve_config;
use gcal_bridge::credentials::CredentialStore;
use gcal_bridge::oauth::token_http_client;
use gcal_bridge::session::{select_active_session, SessionCredentials};
use gcal_bridge::BridgeError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Http,
    Stdio,
}

#[derive(Parser, Debug)]
#[command(name = "calendar-mcp", about = "Google Calendar MCP server")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "GCAL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "http")]
    transport: Transport,

    /// Overrides `mcp.host`
    #[arg(long)]
    host: Option<String>,

    /// Overrides `mcp.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries protocol frames on the stdio transport
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calendar_mcp=info,gcal_bridge=info".into()),
        )
        .init();

    let config = resolve_config(args.config.as_deref())?;

    let store = Arc::new(CredentialStore::load(&config.store.path));
    let active = match select_active_session(&store) {
        Ok(active) => active,
        Err(BridgeError::NoActiveSession) => anyhow::bail!(
            "No session found in {}. Launch the Google OAuth server and complete /oauth/ first",
            config.store.path.display()
        ),
        Err(e) => return Err(e.into()),
    };

    let http = token_http_client(config.oauth.exchange_timeout_seconds)?;
    let credentials = Arc::new(SessionCredentials::new(active, Arc::clone(&store), http));
    info!(session_id = %credentials.session_id(), api_base = %config.mcp.api_base, "Session loaded");

    let client = CalendarClient::new(config.mcp.api_base.clone(), credentials)
        .context("Failed to build Calendar API client")?;
    let server = Arc::new(McpServer::new(ToolRegistry::new(Arc::new(client))));

    match args.transport {
        Transport::Stdio => serve_stdio(server).await,
        Transport::Http => {
            let host = args.host.unwrap_or(config.mcp.host);
            let port = args.port.unwrap_or(config.mcp.port);
            serve_http(server, &format!("{}:{}", host, port)).await
        }
    }
}
