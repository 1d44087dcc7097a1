//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use auth_service::auth::{hash_secret, AuthManager, RateLimiter, TokenService};
use auth_service::clock::SharedClock;
use auth_service::config::{Config, JwtKeyConfig};
use auth_service::database::{CredentialStore, SqliteCredentialStore};
use auth_service::models::Identity;
use auth_service::plugins::cache::{CachePlugin, MemoryCache};
use auth_service::plugins::idp::KeycloakProvider;
use auth_service::server::{AppState, RouterOptions, Server};

/// Secret used for the test signing key (32 bytes)
pub const TEST_SIGNING_SECRET: &str = "integration-signing-secret-32byt";

/// Create a test configuration
///
/// The call timeout is generous because argon2 is slow in debug builds.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.jwt.keys = vec![JwtKeyConfig {
        kid: "test".to_string(),
        secret: TEST_SIGNING_SECRET.to_string(),
        retire_at: None,
    }];
    config.auth.call_timeout_ms = 10_000;
    config.rate_limit.max_attempts_per_identity = 3;
    config.rate_limit.max_attempts_per_source = 10;
    config
}

/// Create an in-memory credential store for testing
pub async fn create_test_store() -> Arc<SqliteCredentialStore> {
    Arc::new(
        SqliteCredentialStore::in_memory()
            .await
            .expect("Failed to create test store"),
    )
}

/// Register an identity with a real argon2 hash
pub async fn add_identity<S: CredentialStore>(store: &S, identifier: &str, secret: &str) {
    let hash = hash_secret(secret).expect("Failed to hash secret");
    store
        .create_identity(&Identity::new(identifier, hash))
        .await
        .expect("Failed to create identity");
}

/// Create an authentication manager from `config`, reading time from `clock`
pub fn create_test_manager(
    config: &Config,
    store: Arc<SqliteCredentialStore>,
    clock: SharedClock,
) -> AuthManager<SqliteCredentialStore> {
    let cache: Arc<dyn CachePlugin> = Arc::new(MemoryCache::with_clock(Arc::clone(&clock)));
    let keyring = config.keyring().expect("Failed to build keyring");

    let tokens = TokenService::new(
        keyring,
        Arc::clone(&cache),
        Arc::clone(&clock),
        config.token_config(),
    );
    let rate_limiter = RateLimiter::new(config.rate_limit_config(), cache, clock);
    let manager = AuthManager::new(store, tokens, rate_limiter, config.manager_config());

    match config.keycloak_config() {
        Some(keycloak) => manager.with_identity_provider(Arc::new(
            KeycloakProvider::new(keycloak).expect("Failed to build Keycloak provider"),
        )),
        None => manager,
    }
}

/// Create a test application state
pub fn create_test_state(
    config: &Config,
    store: Arc<SqliteCredentialStore>,
    clock: SharedClock,
) -> AppState<SqliteCredentialStore> {
    let manager = create_test_manager(config, store, clock);
    AppState::new(Arc::new(manager), RouterOptions::from_config(config))
}

/// Run a test server in the background and return the address
///
/// The server records peer addresses, so per-source rate limiting applies.
/// It shuts down when the returned sender is used or dropped.
pub async fn run_test_server(
    config: &Config,
    state: AppState<SqliteCredentialStore>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = Server::new(config.server.clone(), state).app();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");
    });

    // Give the server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
