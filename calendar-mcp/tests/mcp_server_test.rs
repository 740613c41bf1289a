// Integration tests for MCP dispatch against a mocked Calendar API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use calendar_mcp::client::CalendarClient;
use calendar_mcp::server::{create_mcp_router, serve_lines, McpServer};
use calendar_mcp::tools::ToolRegistry;
use gcal_bridge::credentials::{CredentialRecord, CredentialStore};
use gcal_bridge::oauth::token_http_client;
use gcal_bridge::session::{select_active_session, SessionCredentials};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_is, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    server: Arc<McpServer>,
    store: Arc<CredentialStore>,
    _dir: TempDir,
}

fn create_test_server(mock: &MockServer, access_token: &str) -> TestServer {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CredentialStore::load(dir.path().join("session.json")));
    store.put(
        "1700000000-0123456789abcdef0123456789abcdef",
        CredentialRecord {
            access_token: access_token.to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_endpoint: format!("{}/token", mock.uri()),
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
            expiry: None,
        },
    );

    let active = select_active_session(&store).unwrap();
    let credentials = Arc::new(SessionCredentials::new(
        active,
        Arc::clone(&store),
        token_http_client(5).unwrap(),
    ));
    let client = CalendarClient::new(mock.uri(), credentials).unwrap();

    TestServer {
        server: Arc::new(McpServer::new(ToolRegistry::new(Arc::new(client)))),
        store,
        _dir: dir,
    }
}

async fn rpc(server: &McpServer, request: Value) -> Value {
    let response = server
        .handle_message(&request.to_string())
        .await
        .expect("request with id gets a response");
    serde_json::to_value(response).unwrap()
}

fn call(name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let mock = MockServer::start().await;
    let app = create_test_server(&mock, "ya29.init");

    let init = rpc(
        &app.server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0"}
            }
        }),
    )
    .await;
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");
    assert!(init["result"]["capabilities"]["tools"].is_object());

    let list = rpc(&app.server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let tools = list["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 16);
    assert!(tools.iter().any(|t| t["name"] == "list_events"));
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));

    let ping = rpc(&app.server, json!({"jsonrpc": "2.0", "id": 3, "method": "ping"})).await;
    assert_eq!(ping["result"], json!({}));
}

#[tokio::test]
async fn test_unknown_method_tool_and_bad_arguments() {
    let mock = MockServer::start().await;
    let app = create_test_server(&mock, "ya29.errors");

    let resp = rpc(&app.server, json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"})).await;
    assert_eq!(resp["error"]["code"], -32601);

    let resp = rpc(&app.server, call("delete_calendar", json!({}))).await;
    assert_eq!(resp["error"]["code"], -32601);

    let resp = rpc(&app.server, call("get_event", json!({"calendar_id": "primary"}))).await;
    assert_eq!(resp["error"]["code"], -32602);

    let parse = app.server.handle_message("{not json").await.unwrap();
    let parse = serde_json::to_value(parse).unwrap();
    assert_eq!(parse["error"]["code"], -32700);
    assert!(parse["id"].is_null());
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let mock = MockServer::start().await;
    let app = create_test_server(&mock, "ya29.notify");

    let resp = app
        .server
        .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    assert!(resp.is_none());
}

#[tokio::test]
async fn test_list_calendars_forwards_bearer_token() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(header_is("authorization", "Bearer ya29.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "calendar#calendarList",
            "items": [{"id": "primary", "summary": "Me"}]
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let app = create_test_server(&mock, "ya29.list");
    let resp = rpc(&app.server, call("list_calendars", json!({}))).await;

    assert_eq!(resp["result"]["isError"], false);
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["items"][0]["summary"], "Me");
}

#[tokio::test]
async fn test_list_events_passes_query_params() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/team%40example.com/events"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("timeMin", "2024-01-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&mock)
        .await;

    let app = create_test_server(&mock, "ya29.events");
    let resp = rpc(
        &app.server,
        call(
            "list_events",
            json!({
                "calendar_id": "team@example.com",
                "params": {"singleEvents": true, "timeMin": "2024-01-01T00:00:00Z"}
            }),
        ),
    )
    .await;

    assert_eq!(resp["result"]["isError"], false);
}

#[tokio::test]
async fn test_api_error_is_tool_error_result() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Not Found"}
        })))
        .mount(&mock)
        .await;

    let app = create_test_server(&mock, "ya29.missing");
    let resp = rpc(&app.server, call("get_calendar", json!({"calendar_id": "missing"}))).await;

    assert!(resp.get("error").is_none());
    assert_eq!(resp["result"]["isError"], true);
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("404"));
    assert!(text.contains("Not Found"));
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_retries_once() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/settings"))
        .and(header_is("authorization", "Bearer ya29.stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Invalid Credentials"}
        })))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/settings"))
        .and(header_is("authorization", "Bearer ya29.fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&mock)
        .await;

    let app = create_test_server(&mock, "ya29.stale");
    let resp = rpc(&app.server, call("list_settings", json!({}))).await;
    assert_eq!(resp["result"]["isError"], false);

    // Refreshed token written back for the next startup
    let session_id = app.store.sessions().remove(0);
    let stored = app.store.get(&session_id).unwrap();
    assert_eq!(stored.access_token, "ya29.fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn test_http_transport() {
    let mock = MockServer::start().await;
    let app = create_test_server(&mock, "ya29.http");
    let router = create_mcp_router(Arc::clone(&app.server));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["id"], "a");

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .body(Body::from(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_stdio_lines() {
    let mock = MockServer::start().await;
    let app = create_test_server(&mock, "ya29.stdio");

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        "\n\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n"
    );
    let mut output = Vec::new();
    serve_lines(&app.server, input.as_bytes(), &mut output).await.unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[1]["id"], 2);
}

#[tokio::test]
async fn test_stdio_survives_invalid_utf8_line() {
    let mock = MockServer::start().await;
    let app = create_test_server(&mock, "ya29.utf8");

    let mut input: Vec<u8> = vec![0xff, 0xfe, b'{', b'\n'];
    input.extend_from_slice(br#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#);
    input.push(b'\n');

    let mut output = Vec::new();
    serve_lines(&app.server, input.as_slice(), &mut output).await.unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["error"]["code"], -32700);
    assert!(lines[0]["id"].is_null());
    assert_eq!(lines[1]["id"], 9);
    assert_eq!(lines[1]["result"], json!({}));
}
