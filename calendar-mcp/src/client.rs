//! Google Calendar REST client.
//!
//! Every request carries the active session's bearer token. A 401 triggers
//! one token refresh and a single retry.

use gcal_bridge::session::SessionCredentials;
use gcal_bridge::BridgeError;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Google API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse JSON response: {0}")]
    InvalidResponse(String),

    #[error("Authorization failed: {0}")]
    Auth(#[from] BridgeError),
}

/// Query string pairs, in order. Repeated keys are allowed.
pub type Query = Vec<(String, String)>;

pub struct CalendarClient {
    http: Client,
    base_url: String,
    credentials: Arc<SessionCredentials>,
}

impl CalendarClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<SessionCredentials>) -> Result<Self, CalendarError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    /// Send `method path?query` with an optional JSON body.
    ///
    /// Returns the parsed body, or `{}` for an empty successful response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value, CalendarError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.credentials.access_token().await?;

        let (status, text) = self.send(method.clone(), &url, query, body, &token).await?;

        let (status, text) = if status == StatusCode::UNAUTHORIZED {
            warn!(path = %path, "Calendar API rejected the access token");
            let renewed = self.credentials.force_refresh(&token).await?;
            self.send(method, &url, query, body, &renewed).await?
        } else {
            (status, text)
        };

        parse_response(status, &text)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &Query,
        body: Option<&Value>,
        token: &str,
    ) -> Result<(StatusCode, String), CalendarError> {
        debug!(method = %method, url = %url, "Calendar API request");

        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!(status = %status, "Calendar API response");
        Ok((status, text))
    }
}

fn parse_response(status: StatusCode, body: &str) -> Result<Value, CalendarError> {
    if status.is_success() && body.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|parsed| extract_error_message(&parsed))
            .unwrap_or_else(|| format!("HTTP {}", status));
        error!(status = status.as_u16(), "Google API error: {}", message);
        return Err(CalendarError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(body).map_err(|e| CalendarError::InvalidResponse(format!("{} (body: {})", e, body)))
}

/// Google errors look like `{"error": {"code": 404, "message": "Not Found"}}`.
fn extract_error_message(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Percent-encode one path segment (calendar IDs contain `@` and `#`).
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
