//! HTTP router and handlers
//!
//! - `GET /.well-known/jwks.json`: the published signing key set, verbatim
//! - `POST <cookie exchange>`: turns the bearer token into a session cookie
//! - `GET /health`: liveness plus cache and key-set counters

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::cache::IdentityCache;
use crate::credential::bearer::extract_token;
use crate::token::JwkPublisher;

/// Path of the key set document
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
/// Name of the session cookie set by the cookie exchange
pub const SESSION_COOKIE: &str = "geti-cookie";

/// Shared application state
pub struct AppState {
    /// Key set publisher
    pub publisher: Arc<JwkPublisher>,
    /// Identity cache, for health counters
    pub cache: Arc<IdentityCache>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, cookie_exchange_path: &str) -> Router {
    Router::new()
        .route(JWKS_PATH, get(jwks_handler))
        .route(cookie_exchange_path, post(cookie_exchange_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn jwks_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        state.publisher.published(),
    )
}

/// Cookie exchange handler
///
/// The bearer token is stored in an HTTP-only cookie so that browser
/// requests which cannot set headers (downloads, media) still authenticate.
async fn cookie_exchange_handler(headers: HeaderMap) -> impl IntoResponse {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| extract_token(v).ok());

    match token {
        Some(token) => {
            let cookie =
                format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; Secure; SameSite=Strict");
            (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
        }
        None => {
            debug!("Cookie exchange without a bearer token");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": state.cache.stats(),
        "published_keys": state.publisher.key_count(),
    }))
}
