//! HTTP router for auth-service
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks and the metrics snapshot
//! - Login, federated login, token verification and revocation

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};

use crate::auth::AuthManager;
use crate::config::Config;
use crate::database::CredentialStore;
use crate::error::AuthError;
use crate::models::{LoginRequest, LoginResponse, TokenRequest, VerifyResponse};

use super::middleware::ApiError;

/// Source reported when the peer address is not known
pub const UNKNOWN_SOURCE: &str = "unknown";

/// HTTP surface options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    /// Serve the metrics snapshot
    pub metrics_enabled: bool,

    /// Path of the metrics snapshot
    pub metrics_path: String,

    /// Report precise token error kinds instead of `unauthorized`
    pub expose_token_error_kinds: bool,
}

impl RouterOptions {
    /// Options derived from the application configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            metrics_enabled: config.metrics.enabled,
            metrics_path: config.metrics.path.clone(),
            expose_token_error_kinds: config.auth.expose_token_error_kinds,
        }
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            expose_token_error_kinds: false,
        }
    }
}

/// Shared application state
pub struct AppState<S: CredentialStore> {
    /// Authentication manager
    pub auth_manager: Arc<AuthManager<S>>,

    /// HTTP surface options
    pub options: Arc<RouterOptions>,
}

impl<S: CredentialStore> AppState<S> {
    /// Create state from a manager and options
    pub fn new(auth_manager: Arc<AuthManager<S>>, options: RouterOptions) -> Self {
        Self {
            auth_manager,
            options: Arc::new(options),
        }
    }

    /// Turn an authentication error into a response
    fn error(&self, error: AuthError) -> ApiError {
        let api_error =
            ApiError::new(error).expose_token_error_kinds(self.options.expose_token_error_kinds);

        if matches!(api_error.error(), AuthError::RateLimited) {
            api_error.with_retry_after(self.auth_manager.rate_limiter().retry_after())
        } else {
            api_error
        }
    }
}

impl<S: CredentialStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            auth_manager: Arc::clone(&self.auth_manager),
            options: Arc::clone(&self.options),
        }
    }
}

/// Build the main application router
///
/// The metrics route is only registered when enabled, so a disabled snapshot
/// answers 404 like any unknown path.
pub fn build_router<S: CredentialStore + 'static>(state: AppState<S>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", post(login_handler::<S>))
        .route("/auth/federated/login", post(federated_login_handler::<S>))
        .route("/auth/verify", post(verify_handler::<S>))
        .route("/auth/revoke", post(revoke_handler::<S>));

    if state.options.metrics_enabled {
        let path = state.options.metrics_path.clone();
        router = router.route(&path, get(metrics_handler::<S>));
    }

    router.with_state(state)
}

/// Peer address of the request, when the server records it
fn request_source(connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
}

/// Token from a `{token}` body, or else from an `Authorization: Bearer` header
///
/// A request that presents no token is unauthenticated, so it fails like an
/// unusable token. Only an unparseable body is a bad request.
fn presented_token(headers: &HeaderMap, body: &Bytes) -> Result<String, AuthError> {
    if !body.is_empty() {
        let request: TokenRequest = serde_json::from_slice(body)
            .map_err(|_| AuthError::InvalidRequest("malformed request body".to_string()))?;
        if request.token.is_empty() {
            return Err(AuthError::TokenMalformed);
        }
        return Ok(request.token);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::TokenMalformed)
}

fn login_body(
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<LoginRequest, AuthError> {
    payload
        .map(|Json(request)| request)
        .map_err(|e| AuthError::InvalidRequest(e.body_text()))
}

// =============================================================================
// Health and Metrics Handlers
// =============================================================================

/// Health check endpoint handler
async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Metrics snapshot handler
async fn metrics_handler<S: CredentialStore + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    Json(state.auth_manager.metrics().snapshot())
}

// =============================================================================
// Auth Handlers
// =============================================================================

/// Local login handler
async fn login_handler<S: CredentialStore + 'static>(
    State(state): State<AppState<S>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = login_body(payload).map_err(|e| state.error(e))?;
    let source = request_source(connect_info.as_ref());

    let issued = state
        .auth_manager
        .authenticate(&request.identity_ref, &request.secret, &source)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(issued.into()))
}

/// Federated login handler
async fn federated_login_handler<S: CredentialStore + 'static>(
    State(state): State<AppState<S>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = login_body(payload).map_err(|e| state.error(e))?;
    let source = request_source(connect_info.as_ref());

    let issued = state
        .auth_manager
        .authenticate_federated(&request.identity_ref, &request.secret, &source)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(issued.into()))
}

/// Token verification handler
async fn verify_handler<S: CredentialStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyResponse>, ApiError> {
    let token = presented_token(&headers, &body).map_err(|e| state.error(e))?;

    let identity_ref = state
        .auth_manager
        .verify(&token)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(VerifyResponse { identity_ref }))
}

/// Token revocation handler
async fn revoke_handler<S: CredentialStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let token = presented_token(&headers, &body).map_err(|e| state.error(e))?;

    state
        .auth_manager
        .revoke_token(&token)
        .await
        .map_err(|e| state.error(e))?;

    Ok(StatusCode::NO_CONTENT)
}
