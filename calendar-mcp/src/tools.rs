//! Calendar tool catalog and dispatch.
//!
//! Each tool maps its arguments onto one Calendar API request: path IDs
//! are percent-encoded, `params` becomes the query string and `body` the
//! JSON payload. Failures from the API come back as tool results with
//! `isError` set, so the model can read them.

use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::{segment, CalendarClient, Query};
use crate::protocol::{McpTool, ToolAnnotations, ToolsCallResponse, ToolsListResponse};

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// One outbound API request derived from a tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCall {
    pub method: Method,
    pub path: String,
    pub query: Query,
    pub body: Option<Value>,
}

pub struct ToolRegistry {
    tools: Vec<McpTool>,
    client: Arc<CalendarClient>,
}

impl ToolRegistry {
    pub fn new(client: Arc<CalendarClient>) -> Self {
        Self {
            tools: catalog(),
            client,
        }
    }

    pub fn list_response(&self) -> ToolsListResponse {
        ToolsListResponse {
            tools: self.tools.clone(),
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResponse, ToolCallError> {
        let call = build_call(name, &arguments)?;
        info!(tool = %name, method = %call.method, path = %call.path, "Calling tool");

        match self
            .client
            .request(call.method, &call.path, &call.query, call.body.as_ref())
            .await
        {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                Ok(ToolsCallResponse::ok(text))
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                Ok(ToolsCallResponse::failed(e.to_string()))
            }
        }
    }
}

/// Map a tool name and its arguments onto a Calendar API request.
pub fn build_call(name: &str, arguments: &Value) -> Result<CalendarCall, ToolCallError> {
    let args = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        _ => return Err(ToolCallError::InvalidArguments("arguments must be an object".to_string())),
    };
    let args = Args(&args);

    let call = match name {
        "list_calendars" => get("/users/me/calendarList".to_string(), args.query()?),
        "get_calendar_list_entry" => get(
            format!("/users/me/calendarList/{}", args.id("calendar_id")?),
            Query::new(),
        ),
        "insert_calendar_list_entry" => {
            let mut body = args.body()?;
            if let Some(calendar_id) = args.optional_str("calendar_id")? {
                body.entry("id".to_string())
                    .or_insert_with(|| Value::String(calendar_id.to_string()));
            }
            if !body.contains_key("id") {
                return Err(ToolCallError::InvalidArguments("missing calendar_id".to_string()));
            }
            send(Method::POST, "/users/me/calendarList".to_string(), args.query()?, body)
        }
        "update_calendar_list_entry" => send(
            Method::PUT,
            format!("/users/me/calendarList/{}", args.id("calendar_id")?),
            args.query()?,
            args.body()?,
        ),
        "get_calendar" => get(format!("/calendars/{}", args.id("calendar_id")?), Query::new()),
        "insert_calendar" => {
            let mut body = Map::new();
            body.insert("summary".to_string(), Value::String(args.str("summary")?.to_string()));
            send(Method::POST, "/calendars".to_string(), Query::new(), body)
        }
        "update_calendar" => send(
            Method::PUT,
            format!("/calendars/{}", args.id("calendar_id")?),
            Query::new(),
            args.body()?,
        ),
        "list_events" => get(
            format!("/calendars/{}/events", args.id("calendar_id")?),
            args.query()?,
        ),
        "get_event" => get(
            format!(
                "/calendars/{}/events/{}",
                args.id("calendar_id")?,
                args.id("event_id")?
            ),
            args.query()?,
        ),
        "insert_event" => send(
            Method::POST,
            format!("/calendars/{}/events", args.id("calendar_id")?),
            args.query()?,
            args.body()?,
        ),
        "get_instances" => get(
            format!(
                "/calendars/{}/events/{}/instances",
                args.id("calendar_id")?,
                args.id("event_id")?
            ),
            args.query()?,
        ),
        "quick_add_event" => {
            // `text` may come top-level or inside `params`
            let params = args.query()?;
            let query: Query = match args.optional_str("text")?.filter(|t| !t.is_empty()) {
                Some(text) => std::iter::once(("text".to_string(), text.to_string()))
                    .chain(params.into_iter().filter(|(k, _)| k != "text"))
                    .collect(),
                None if params.iter().any(|(k, v)| k == "text" && !v.is_empty()) => params,
                None => return Err(ToolCallError::InvalidArguments("missing text".to_string())),
            };
            CalendarCall {
                method: Method::POST,
                path: format!("/calendars/{}/events/quickAdd", args.id("calendar_id")?),
                query,
                body: None,
            }
        }
        "patch_event" => send(
            Method::PATCH,
            format!(
                "/calendars/{}/events/{}",
                args.id("calendar_id")?,
                args.id("event_id")?
            ),
            args.query()?,
            args.body()?,
        ),
        "update_event" => send(
            Method::PUT,
            format!(
                "/calendars/{}/events/{}",
                args.id("calendar_id")?,
                args.id("event_id")?
            ),
            args.query()?,
            args.body()?,
        ),
        "list_settings" => get("/users/me/settings".to_string(), args.query()?),
        "get_setting" => get(format!("/users/me/settings/{}", args.id("setting_id")?), Query::new()),
        _ => return Err(ToolCallError::UnknownTool(name.to_string())),
    };

    Ok(call)
}

fn get(path: String, query: Query) -> CalendarCall {
    CalendarCall {
        method: Method::GET,
        path,
        query,
        body: None,
    }
}

fn send(method: Method, path: String, query: Query, body: Map<String, Value>) -> CalendarCall {
    CalendarCall {
        method,
        path,
        query,
        body: Some(Value::Object(body)),
    }
}

struct Args<'a>(&'a Map<String, Value>);

impl Args<'_> {
    fn optional_str(&self, key: &str) -> Result<Option<&str>, ToolCallError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ToolCallError::InvalidArguments(format!("{} must be a string", key))),
        }
    }

    fn str(&self, key: &str) -> Result<&str, ToolCallError> {
        match self.optional_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ToolCallError::InvalidArguments(format!("missing {}", key))),
        }
    }

    /// A required string argument, encoded for use as a path segment.
    fn id(&self, key: &str) -> Result<String, ToolCallError> {
        self.str(key).map(segment)
    }

    fn body(&self) -> Result<Map<String, Value>, ToolCallError> {
        match self.0.get("body") {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(ToolCallError::InvalidArguments("body must be an object".to_string())),
        }
    }

    /// `params` as query pairs. Arrays repeat the key, nulls are dropped.
    fn query(&self) -> Result<Query, ToolCallError> {
        let params = match self.0.get("params") {
            None | Some(Value::Null) => return Ok(Query::new()),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ToolCallError::InvalidArguments("params must be an object".to_string())),
        };

        let mut query = Query::new();
        for (key, value) in params {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if let Some(s) = scalar(key, item)? {
                            query.push((key.clone(), s));
                        }
                    }
                }
                other => {
                    if let Some(s) = scalar(key, other)? {
                        query.push((key.clone(), s));
                    }
                }
            }
        }
        Ok(query)
    }
}

fn scalar(key: &str, value: &Value) -> Result<Option<String>, ToolCallError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(ToolCallError::InvalidArguments(format!(
            "params.{} must be a scalar or a list of scalars",
            key
        ))),
    }
}

fn string_prop(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn params_prop(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "additionalProperties": true
    })
}

fn body_prop(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "additionalProperties": true
    })
}

fn schema(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let props: Map<String, Value> = properties
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    json!({
        "type": "object",
        "properties": props,
        "required": required,
    })
}

fn tool(name: &str, description: &str, input_schema: Value, read_only: bool) -> McpTool {
    McpTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
        annotations: Some(ToolAnnotations {
            read_only_hint: Some(read_only),
            idempotent_hint: Some(read_only),
        }),
    }
}

/// The tool descriptors served by `tools/list`.
pub fn catalog() -> Vec<McpTool> {
    let calendar_id = || string_prop("Calendar identifier, or \"primary\" for the user's primary calendar");
    let event_id = || string_prop("Event identifier");

    vec![
        tool(
            "list_calendars",
            "Returns the calendars on the user's calendar list",
            schema(
                vec![("params", params_prop("Optional query parameters such as maxResults, pageToken, showHidden"))],
                &[],
            ),
            true,
        ),
        tool(
            "get_calendar_list_entry",
            "Returns a calendar from the user's calendar list",
            schema(vec![("calendar_id", calendar_id())], &["calendar_id"]),
            true,
        ),
        tool(
            "insert_calendar_list_entry",
            "Inserts an existing calendar into the user's calendar list",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("params", params_prop("Query parameters such as colorRgbFormat")),
                    ("body", body_prop("CalendarListEntry fields such as colorId, hidden, selected, summaryOverride")),
                ],
                &["calendar_id"],
            ),
            false,
        ),
        tool(
            "update_calendar_list_entry",
            "Updates an existing calendar on the user's calendar list",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("params", params_prop("Query parameters such as colorRgbFormat")),
                    ("body", body_prop("CalendarListEntry fields to store")),
                ],
                &["calendar_id"],
            ),
            false,
        ),
        tool(
            "get_calendar",
            "Returns metadata for a calendar",
            schema(vec![("calendar_id", calendar_id())], &["calendar_id"]),
            true,
        ),
        tool(
            "insert_calendar",
            "Creates a secondary calendar",
            schema(vec![("summary", string_prop("Title of the new calendar"))], &["summary"]),
            false,
        ),
        tool(
            "update_calendar",
            "Update a calendar's settings",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("body", body_prop("Calendar fields such as summary, description, location, timeZone")),
                ],
                &["calendar_id"],
            ),
            false,
        ),
        tool(
            "list_events",
            "List events on a specified calendar with optional filters",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    (
                        "params",
                        params_prop("Filters such as timeMin, timeMax, q, singleEvents, orderBy, maxResults, pageToken"),
                    ),
                ],
                &["calendar_id"],
            ),
            true,
        ),
        tool(
            "get_event",
            "Get a single event by ID",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("event_id", event_id()),
                    ("params", params_prop("Query parameters such as timeZone, maxAttendees")),
                ],
                &["calendar_id", "event_id"],
            ),
            true,
        ),
        tool(
            "insert_event",
            "Create an event",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("params", params_prop("Query parameters such as sendUpdates, conferenceDataVersion")),
                    ("body", body_prop("Event resource with at least start and end")),
                ],
                &["calendar_id", "body"],
            ),
            false,
        ),
        tool(
            "get_instances",
            "Returns instances of the specified recurring event",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("event_id", event_id()),
                    ("params", params_prop("Query parameters such as timeMin, timeMax, maxResults")),
                ],
                &["calendar_id", "event_id"],
            ),
            true,
        ),
        tool(
            "quick_add_event",
            "Creates an event based on a simple text string",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("text", string_prop("Text describing the event, e.g. \"Lunch with Sam tomorrow at noon\"")),
                    ("params", params_prop("Query parameters such as sendUpdates; text may also be given here")),
                ],
                &["calendar_id"],
            ),
            false,
        ),
        tool(
            "patch_event",
            "Patch fields on an existing event",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("event_id", event_id()),
                    ("params", params_prop("Query parameters such as sendUpdates")),
                    ("body", body_prop("Event fields to change")),
                ],
                &["calendar_id", "event_id", "body"],
            ),
            false,
        ),
        tool(
            "update_event",
            "Update an existing event. Overrides all fields",
            schema(
                vec![
                    ("calendar_id", calendar_id()),
                    ("event_id", event_id()),
                    ("params", params_prop("Query parameters such as sendUpdates")),
                    ("body", body_prop("Complete event resource")),
                ],
                &["calendar_id", "event_id", "body"],
            ),
            false,
        ),
        tool(
            "list_settings",
            "List user settings",
            schema(vec![("params", params_prop("Optional query parameters such as maxResults, pageToken"))], &[]),
            true,
        ),
        tool(
            "get_setting",
            "Get one user setting",
            schema(
                vec![("setting_id", string_prop("Setting name, e.g. timezone or weekStart"))],
                &["setting_id"],
            ),
            true,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_unique_and_complete() {
        let tools = catalog();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 16);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 16);

        // Every catalogued tool is dispatchable
        for t in &tools {
            let err = build_call(&t.name, &json!({}));
            assert!(!matches!(err, Err(ToolCallError::UnknownTool(_))), "{}", t.name);
        }
    }

    #[test]
    fn test_required_arguments_are_declared() {
        for t in catalog() {
            let required = t.input_schema["required"].as_array().unwrap();
            for r in required {
                let key = r.as_str().unwrap();
                assert!(t.input_schema["properties"].get(key).is_some(), "{}.{}", t.name, key);
            }
        }
    }

    #[test]
    fn test_list_events_query_from_params() {
        let call = build_call(
            "list_events",
            &json!({
                "calendar_id": "primary",
                "params": {
                    "timeMin": "2024-01-01T00:00:00Z",
                    "singleEvents": true,
                    "maxResults": 10,
                    "eventTypes": ["default", "focusTime"],
                    "q": null
                }
            }),
        )
        .unwrap();

        assert_eq!(call.method, Method::GET);
        assert_eq!(call.path, "/calendars/primary/events");
        assert!(call.body.is_none());
        assert!(call.query.contains(&("singleEvents".to_string(), "true".to_string())));
        assert!(call.query.contains(&("maxResults".to_string(), "10".to_string())));
        let event_types: Vec<_> = call.query.iter().filter(|(k, _)| k == "eventTypes").collect();
        assert_eq!(event_types.len(), 2);
        assert!(!call.query.iter().any(|(k, _)| k == "q"));
    }

    #[test]
    fn test_ids_are_percent_encoded() {
        let call = build_call(
            "get_event",
            &json!({"calendar_id": "team@group.calendar.google.com", "event_id": "abc/def"}),
        )
        .unwrap();
        assert_eq!(call.path, "/calendars/team%40group.calendar.google.com/events/abc%2Fdef");
    }

    #[test]
    fn test_insert_calendar_list_entry_posts_id_in_body() {
        let call = build_call(
            "insert_calendar_list_entry",
            &json!({"calendar_id": "shared@example.com", "body": {"hidden": false}}),
        )
        .unwrap();
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.path, "/users/me/calendarList");
        let body = call.body.unwrap();
        assert_eq!(body["id"], "shared@example.com");
        assert_eq!(body["hidden"], false);
    }

    #[test]
    fn test_quick_add_puts_text_in_query() {
        let call = build_call(
            "quick_add_event",
            &json!({"calendar_id": "primary", "text": "Lunch tomorrow at noon", "params": {"sendUpdates": "none"}}),
        )
        .unwrap();
        assert_eq!(call.path, "/calendars/primary/events/quickAdd");
        assert_eq!(call.query[0], ("text".to_string(), "Lunch tomorrow at noon".to_string()));
        assert_eq!(call.query[1], ("sendUpdates".to_string(), "none".to_string()));
        assert!(call.body.is_none());
    }

    #[test]
    fn test_quick_add_accepts_text_in_params() {
        let call = build_call(
            "quick_add_event",
            &json!({"calendar_id": "primary", "params": {"text": "Dentist Friday 3pm", "sendUpdates": "all"}}),
        )
        .unwrap();
        assert!(call.query.contains(&("text".to_string(), "Dentist Friday 3pm".to_string())));
        assert!(call.query.contains(&("sendUpdates".to_string(), "all".to_string())));

        // Top-level text wins over params.text
        let call = build_call(
            "quick_add_event",
            &json!({"calendar_id": "primary", "text": "Top", "params": {"text": "Nested"}}),
        )
        .unwrap();
        assert_eq!(call.query, vec![("text".to_string(), "Top".to_string())]);

        assert!(matches!(
            build_call("quick_add_event", &json!({"calendar_id": "primary"})),
            Err(ToolCallError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_write_methods() {
        let args = json!({"calendar_id": "primary", "event_id": "e1", "body": {"summary": "x"}});
        assert_eq!(build_call("patch_event", &args).unwrap().method, Method::PATCH);
        assert_eq!(build_call("update_event", &args).unwrap().method, Method::PUT);

        let call = build_call("insert_calendar", &json!({"summary": "Project"})).unwrap();
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.path, "/calendars");
        assert_eq!(call.body.unwrap(), json!({"summary": "Project"}));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            build_call("get_calendar", &json!({})),
            Err(ToolCallError::InvalidArguments(_))
        ));
        assert!(matches!(
            build_call("get_calendar", &json!({"calendar_id": 5})),
            Err(ToolCallError::InvalidArguments(_))
        ));
        assert!(matches!(
            build_call("list_events", &json!({"calendar_id": "primary", "params": {"nested": {"a": 1}}})),
            Err(ToolCallError::InvalidArguments(_))
        ));
        assert!(matches!(
            build_call("insert_event", &json!({"calendar_id": "primary", "body": "text"})),
            Err(ToolCallError::InvalidArguments(_))
        ));
        assert!(matches!(
            build_call("list_calendars", &json!([1, 2])),
            Err(ToolCallError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_unknown_tool() {
        assert!(matches!(
            build_call("delete_everything", &json!({})),
            Err(ToolCallError::UnknownTool(name)) if name == "delete_everything"
        ));
    }
}
