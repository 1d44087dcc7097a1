//! auth-service - A token-issuing authentication service
//!
//! This is the main entry point for the auth-service application.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, error, info};

use auth_service::auth::{hash_secret, AuthManager, RateLimiter, TokenService};
use auth_service::clock::system_clock;
use auth_service::config::{CacheBackend, Config};
use auth_service::database::{CredentialStore, SqliteCredentialStore};
use auth_service::error::AppError;
use auth_service::models::Identity;
use auth_service::otel::{init_tracing, AuthMetrics, OtelProvider};
use auth_service::plugins::cache::{CachePlugin, MemoryCache, RedisCache};
use auth_service::plugins::idp::KeycloakProvider;
use auth_service::server::{AppState, RouterOptions, Server};

/// Environment variable holding the secret for `create-identity`
const SECRET_ENV: &str = "AUTH_SERVICE_SECRET";

/// How often expired in-memory cache entries are dropped
const CACHE_PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// auth-service - A token-issuing authentication service
#[derive(Parser, Debug)]
#[command(name = "auth-service")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTH_SERVICE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,

    /// Register an identity in the credential store
    ///
    /// The secret is read from AUTH_SERVICE_SECRET.
    CreateIdentity {
        /// Identifier of the new identity
        identifier: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize OpenTelemetry provider
    let otel_provider = OtelProvider::new(&config.otel)?;

    // Initialize tracing/logging
    init_tracing(&otel_provider, &config.logging)?;

    // Initialize credential store
    let store = SqliteCredentialStore::with_pool_size(
        config.database.path(),
        config.database.pool_size,
    )
    .await?;
    let store = Arc::new(store);
    info!(
        path = %config.database.path(),
        pool_size = store.pool_size(),
        "Credential store initialized"
    );

    if let Some(Command::CreateIdentity { identifier }) = &args.command {
        let result = create_identity(store.as_ref(), identifier).await;
        if let Err(e) = otel_provider.shutdown() {
            error!(error = %e, "Failed to shutdown OpenTelemetry");
        }
        return result.map_err(Into::into);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting auth-service"
    );

    let metrics = Arc::new(AuthMetrics::new(&otel_provider.meter()));
    let state = build_state(&config, store, metrics).await?;

    // Create and start the HTTP server
    let server = Server::new(config.server.clone(), state);
    let shutdown_signal = shutdown_signal();

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    // Run the server
    let result = server.run(shutdown_signal).await;

    // Shutdown OpenTelemetry
    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("auth-service shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Wire cache, token service, rate limiter and identity provider together
async fn build_state(
    config: &Config,
    store: Arc<SqliteCredentialStore>,
    metrics: Arc<AuthMetrics>,
) -> Result<AppState<SqliteCredentialStore>, AppError> {
    let cache: Arc<dyn CachePlugin> = match config.cache.backend {
        CacheBackend::Memory => {
            info!("Using in-memory cache");
            let cache = Arc::new(MemoryCache::new());
            spawn_cache_purge(Arc::clone(&cache));
            cache
        }
        CacheBackend::Redis => {
            let cache = RedisCache::connect(config.redis_cache_config()).await?;
            info!(url = %cache.url(), prefix = %cache.prefix(), "Using Redis cache");
            Arc::new(cache)
        }
    };

    let keyring = config
        .keyring()
        .map_err(|e| AppError::Config(e.to_string()))?;
    info!(kids = ?keyring.kids(), "Signing keys loaded");

    let tokens = TokenService::new(
        keyring,
        Arc::clone(&cache),
        system_clock(),
        config.token_config(),
    );
    let rate_limiter = RateLimiter::new(config.rate_limit_config(), cache, system_clock());

    let mut auth_manager =
        AuthManager::new(store, tokens, rate_limiter, config.manager_config()).with_metrics(metrics);

    if let Some(keycloak_config) = config.keycloak_config() {
        info!(
            base_url = %keycloak_config.base_url,
            realm = %keycloak_config.realm,
            "Keycloak identity provider enabled"
        );
        let provider = KeycloakProvider::new(keycloak_config)?;
        auth_manager = auth_manager.with_identity_provider(Arc::new(provider));
    }

    Ok(AppState::new(
        Arc::new(auth_manager),
        RouterOptions::from_config(config),
    ))
}

/// Drop expired in-memory entries once per minute
///
/// Lookups already ignore expired entries; this bounds memory held by
/// rate-limit counters of past windows.
fn spawn_cache_purge(cache: Arc<MemoryCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired().await;
            if purged > 0 {
                debug!(purged = purged, "Purged expired cache entries");
            }
        }
    });
}

/// Hash the secret from the environment and register the identity
async fn create_identity<S: CredentialStore>(store: &S, identifier: &str) -> Result<(), AppError> {
    let secret = std::env::var(SECRET_ENV)
        .map_err(|_| AppError::Config(format!("{} must be set", SECRET_ENV)))?;
    if identifier.is_empty() || secret.is_empty() {
        return Err(AppError::Config(
            "identifier and secret must not be empty".to_string(),
        ));
    }

    let hash = hash_secret(&secret).map_err(|e| AppError::Internal(e.to_string()))?;
    store
        .create_identity(&Identity::new(identifier, hash))
        .await?;

    info!(identifier = %identifier, "Identity created");
    Ok(())
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
