//! HTTP server components for auth-service
//!
//! This module provides the HTTP server infrastructure including:
//! - Router configuration and route handlers
//! - Error mapping, logging and tracing middleware
//! - Server lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{logging_middleware, status_for, tracing_middleware, ApiError};
pub use router::{build_router, AppState, RouterOptions};

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::database::CredentialStore;

/// HTTP Server for auth-service
///
/// Manages the axum server lifecycle, including:
/// - Binding to configured address
/// - Applying middleware layers and the whole-request deadline
/// - Graceful shutdown handling
pub struct Server<S: CredentialStore + 'static> {
    config: ServerConfig,
    state: AppState<S>,
}

impl<S: CredentialStore + 'static> Server<S> {
    /// Create a new server instance
    pub fn new(config: ServerConfig, state: AppState<S>) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.config.host.parse().unwrap_or([0, 0, 0, 0].into()),
            self.config.port,
        )
    }

    /// Router with every middleware layer applied
    ///
    /// Dropping a request at the deadline drops its handler future, which
    /// cancels whatever store, cache or provider call it was awaiting.
    pub fn app(&self) -> axum::Router {
        build_router(self.state.clone())
            .layer(axum::middleware::from_fn(tracing_middleware))
            .layer(axum::middleware::from_fn(logging_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until shutdown signal is received
    ///
    /// Returns Ok(()) if the server shuts down gracefully.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr();
        let app = self.app();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),
}
