//! OAuth endpoints of the authorization server.
//!
//! 1. GET /oauth/ → 302 to Google's consent page
//! 2. User authorizes
//! 3. Google redirects to /oauth/callback?state=&code=
//! 4. Verify state, exchange code, store the session, 302 to /oauth/success
//! 5. Operator starts the tool server

use super::{pages, AppError};
use crate::credentials::{generate_session_id, CredentialStore};
use crate::oauth::AuthorizationFlow;
use crate::state_codec::FlowState;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name of the browser cookie carrying the session ID
pub const SESSION_COOKIE: &str = "session_id";

/// 30 days
const SESSION_COOKIE_MAX_AGE: u64 = 30 * 24 * 60 * 60;

/// Shared application state for OAuth API
#[derive(Clone)]
pub struct OAuthAppState {
    pub flow: Arc<AuthorizationFlow>,
    pub credential_store: Arc<CredentialStore>,
    /// Mark the session cookie `Secure` (redirect URI is https)
    pub secure_cookies: bool,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Create OAuth API router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/oauth", get(oauth_start))
        .route("/oauth/", get(oauth_start))
        .route("/oauth/callback", get(oauth_callback))
        .route("/oauth/success", get(oauth_success))
        .route("/oauth/logout", get(oauth_logout))
        .with_state(Arc::new(state))
}

/// GET /oauth/
///
/// Redirects the browser to Google. Query parameters, if any, become the
/// flow state and come back verified on the callback.
async fn oauth_start(
    State(state): State<Arc<OAuthAppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let flow_state: FlowState = params
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();

    let auth_url = state.flow.begin(&flow_state);

    info!("Redirecting to OAuth provider");
    found(&auth_url)
}

/// GET /oauth/callback
///
/// # Errors
/// - 400 when the provider reports an error, a parameter is missing, or the
///   state fails verification
/// - 502 when the token exchange fails
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    debug!("OAuth callback received");

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let (record, flow_state) = state.flow.complete(&code, &csrf_state).await.map_err(|e| {
        error!(error = %e, "OAuth callback rejected");
        AppError::from(e)
    })?;

    let session_id = generate_session_id();
    state.credential_store.put(&session_id, record);

    info!(
        session_id = %session_id,
        flow_state_keys = flow_state.len(),
        "OAuth flow completed, session stored"
    );

    let mut response = found("/oauth/success");
    if let Ok(cookie) = HeaderValue::from_str(&session_cookie(&session_id, state.secure_cookies)) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

/// GET /oauth/success
async fn oauth_success() -> Html<&'static str> {
    Html(pages::SUCCESS_PAGE)
}

/// GET /oauth/logout
///
/// Deletes the session named by the browser cookie and clears the cookie.
async fn oauth_logout(State(state): State<Arc<OAuthAppState>>, headers: HeaderMap) -> Response {
    if let Some(session_id) = cookie_value(&headers, SESSION_COOKIE) {
        let removed = state.credential_store.delete(&session_id);
        info!(session_id = %session_id, removed, "Session logout");
    }

    let mut response = Html(pages::LOGOUT_PAGE).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session_id=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax"),
    );
    response
}

/// 302 Found to `location`
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => AppError::ServerError("Invalid redirect location".to_string()).into_response(),
    }
}

fn session_cookie(session_id: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id, SESSION_COOKIE_MAX_AGE
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of cookie `name` from the request's Cookie headers
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
