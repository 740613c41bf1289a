// HTTP surface of the authorization server

pub mod oauth;
mod pages;

pub use oauth::{create_oauth_router, OAuthAppState, SESSION_COOKIE};

use crate::error::BridgeError;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for HTTP endpoints
pub enum AppError {
    BadRequest(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::InvalidState(_) => AppError::BadRequest("Invalid state parameter".to_string()),
            BridgeError::TokenExchange { .. } => {
                AppError::BadGateway(format!("Failed to exchange authorization code: {}", err))
            }
            other => AppError::ServerError(other.to_string()),
        }
    }
}

/// Full authorization server router: landing page, health, OAuth flow
pub fn create_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(create_oauth_router(state))
        .layer(CorsLayer::permissive())
}

/// GET /
async fn root() -> Html<&'static str> {
    Html(pages::WELCOME_PAGE)
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}
