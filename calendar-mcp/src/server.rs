//! MCP request dispatch and the two transports (stdio and HTTP).

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::protocol::{
    error, success, InitializeResponse, JsonRpcRequest, JsonRpcResponse, ServerCapabilities, ServerInfo,
    ToolsCallRequest, ToolsCapabilities, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, MCP_PROTOCOL_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::tools::{ToolCallError, ToolRegistry};

pub const SERVER_NAME: &str = "Google Calendar MCP Server";

pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Handle one request. Notifications yield `None`.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }
        let id = request.id.clone().unwrap_or_default();

        if request.jsonrpc != "2.0" {
            return Some(error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"", None));
        }

        let response = match request.method.as_str() {
            "initialize" => to_result(id, &initialize_response()),
            "ping" => success(id, json!({})),
            "tools/list" => to_result(id, &self.registry.list_response()),
            "tools/call" => match serde_json::from_value::<ToolsCallRequest>(request.params) {
                Ok(call) => match self.registry.call_tool(&call.name, call.arguments).await {
                    Ok(result) => to_result(id, &result),
                    Err(e @ ToolCallError::UnknownTool(_)) => error(id, METHOD_NOT_FOUND, e.to_string(), None),
                    Err(e @ ToolCallError::InvalidArguments(_)) => error(id, INVALID_PARAMS, e.to_string(), None),
                },
                Err(e) => error(id, INVALID_PARAMS, format!("invalid tools/call params: {}", e), None),
            },
            _ => error(id, METHOD_NOT_FOUND, format!("method not found: {}", request.method), None),
        };

        Some(response)
    }

    /// Handle one raw message. Parse failures answer with a null id.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => Some(error(Value::Null, PARSE_ERROR, format!("parse error: {}", e), None)),
        }
    }
}

fn initialize_response() -> InitializeResponse {
    InitializeResponse {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: ToolsCapabilities { list_changed: false },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        instructions: "A Google Calendar MCP Server using OAuth authentication. Use \"primary\" as the calendar_id for the user's main calendar.".to_string(),
    }
}

fn to_result<T: serde::Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => success(id, value),
        Err(e) => error(id, INTERNAL_ERROR, format!("failed to encode result: {}", e), None),
    }
}

/// Newline-delimited JSON-RPC over any reader/writer pair.
///
/// A line that is not valid UTF-8 gets a parse error; the loop keeps going.
pub async fn serve_lines<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                server.handle_message(trimmed).await
            }
            Err(e) => {
                warn!(error = %e, "Discarding line that is not UTF-8");
                Some(error(Value::Null, PARSE_ERROR, format!("parse error: {}", e), None))
            }
        };

        if let Some(response) = response {
            writer.write_all(serde_json::to_string(&response)?.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    Ok(())
}

pub async fn serve_stdio(server: Arc<McpServer>) -> anyhow::Result<()> {
    info!("Serving MCP over stdio");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(&server, stdin, tokio::io::stdout()).await?;
    info!("stdin closed, exiting");
    Ok(())
}

pub fn create_mcp_router(server: Arc<McpServer>) -> Router {
    Router::new().route("/mcp", post(mcp_handler)).with_state(server)
}

async fn mcp_handler(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

pub async fn serve_http(server: Arc<McpServer>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving MCP over HTTP at http://{}/mcp", addr);

    axum::serve(listener, create_mcp_router(server))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("MCP server error")?;

    Ok(())
}
