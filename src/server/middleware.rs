//! HTTP middleware for auth-service
//!
//! This module provides:
//! - Error response mapping for the authentication taxonomy
//! - Request/response logging
//! - Request spans for OpenTelemetry

use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

use crate::error::AuthError;
use crate::models::ErrorResponse;

/// Error kind reported for token errors unless precise kinds are exposed
pub const COLLAPSED_TOKEN_ERROR_KIND: &str = "unauthorized";

/// HTTP status for an authentication error
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::TokenExpired
        | AuthError::TokenMalformed
        | AuthError::TokenRevoked => StatusCode::UNAUTHORIZED,
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response for the auth endpoints
///
/// The body carries only `errorKind`. Token errors collapse to
/// `unauthorized` so callers cannot tell which check failed.
#[derive(Debug)]
pub struct ApiError {
    error: AuthError,
    retry_after: Option<Duration>,
    expose_token_error_kinds: bool,
}

impl ApiError {
    /// Wrap an authentication error
    pub fn new(error: AuthError) -> Self {
        Self {
            error,
            retry_after: None,
            expose_token_error_kinds: false,
        }
    }

    /// Add a `Retry-After` header
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Report token errors by their precise kind
    pub fn expose_token_error_kinds(mut self, expose: bool) -> Self {
        self.expose_token_error_kinds = expose;
        self
    }

    /// The wrapped error
    pub fn error(&self) -> &AuthError {
        &self.error
    }

    /// `errorKind` value written to the body
    pub fn error_kind(&self) -> &'static str {
        if self.error.is_token_error() && !self.expose_token_error_kinds {
            COLLAPSED_TOKEN_ERROR_KIND
        } else {
            self.error.kind()
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let body = Json(ErrorResponse {
            error_kind: self.error_kind().to_string(),
        });

        let mut response = (status, body).into_response();

        if let Some(retry_after) = self.retry_after {
            // Retry-After is whole seconds; never advertise zero
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Logging middleware function
///
/// Logs method, path, status code and response time for each request.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}

/// Tracing middleware function
///
/// Wraps the whole request, including its async work, in an `http_request`
/// span so exported traces carry the status code.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Query strings are left out; they may carry credentials
    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.route = %path,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use axum_test::TestServer;

    async fn test_handler() -> &'static str {
        "OK"
    }

    async fn rate_limited_handler() -> ApiError {
        ApiError::new(AuthError::RateLimited).with_retry_after(Duration::from_secs(42))
    }

    // Test 1: Status mapping covers the whole taxonomy
    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&AuthError::InvalidRequest("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AuthError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(&AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::TokenMalformed), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::TokenRevoked), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&AuthError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&AuthError::ServiceUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AuthError::InternalError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    // Test 2: Token error kinds collapse unless exposed
    #[test]
    fn test_error_kind_collapse() {
        let collapsed = ApiError::new(AuthError::TokenExpired);
        assert_eq!(collapsed.error_kind(), "unauthorized");

        let exposed = ApiError::new(AuthError::TokenExpired).expose_token_error_kinds(true);
        assert_eq!(exposed.error_kind(), "token_expired");

        // Non-token errors are never collapsed
        let credentials = ApiError::new(AuthError::InvalidCredentials);
        assert_eq!(credentials.error_kind(), "invalid_credentials");
    }

    // Test 3: Error body contains only the kind
    #[tokio::test]
    async fn test_error_response_body() {
        let app = Router::new().route(
            "/fail",
            get(|| async { ApiError::new(AuthError::ServiceUnavailable) }),
        );
        let server = TestServer::new(app).unwrap();

        let response = server.get("/fail").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_json(&serde_json::json!({ "errorKind": "service_unavailable" }));
    }

    // Test 4: Rate limited responses carry Retry-After
    #[tokio::test]
    async fn test_retry_after_header() {
        let app = Router::new().route("/limited", get(rate_limited_handler));
        let server = TestServer::new(app).unwrap();

        let response = server.get("/limited").await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.header("retry-after"), "42");
    }

    // Test 5: Logging and tracing middleware pass responses through
    #[tokio::test]
    async fn test_middleware_passthrough() {
        let app = Router::new()
            .route("/ok", get(test_handler))
            .layer(middleware::from_fn(tracing_middleware))
            .layer(middleware::from_fn(logging_middleware));
        let server = TestServer::new(app).unwrap();

        let response = server.get("/ok").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }
}
