//! Configuration management for auth-service
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::keys::{Keyring, KeyringError, SigningKey, MIN_SECRET_BYTES};
use crate::auth::{ManagerConfig, RateLimitConfig, TokenConfig};
use crate::models::TOKEN_ALGORITHM;
use crate::plugins::cache::RedisCacheConfig;
use crate::plugins::idp::KeycloakConfig;

/// Environment variable prefix for `Config::from_env`
pub const ENV_PREFIX: &str = "AUTH_SERVICE_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Credential store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Token signing configuration
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Federated identity provider configuration
    #[serde(default)]
    pub identity_provider: IdentityProviderConfig,

    /// Metrics endpoint configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Login rate limiting
    #[serde(default)]
    pub rate_limit: AuthRateLimitConfig,

    /// Authentication core behaviour
    #[serde(default)]
    pub auth: AuthConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix AUTH_SERVICE_
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    ///
    /// `lookup` receives the full variable name, prefix included.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut config = Config::default();

        // Server
        if let Some(host) = var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = var("SERVER_PORT") {
            config.server.port = parse_var("SERVER_PORT", &port)?;
        }
        if let Some(secs) = var("SERVER_REQUEST_TIMEOUT_SECS") {
            config.server.request_timeout_secs = parse_var("SERVER_REQUEST_TIMEOUT_SECS", &secs)?;
        }

        // Logging
        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.logging.format = format;
        }

        // Database
        if let Some(url) = var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(size) = var("DATABASE_POOL_SIZE") {
            config.database.pool_size = parse_var("DATABASE_POOL_SIZE", &size)?;
        }

        // Cache
        if let Some(backend) = var("CACHE_BACKEND") {
            config.cache.backend = match backend.to_lowercase().as_str() {
                "memory" => CacheBackend::Memory,
                "redis" => CacheBackend::Redis,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "{}CACHE_BACKEND: unknown backend '{}'",
                        ENV_PREFIX, other
                    )))
                }
            };
        }
        if let Some(url) = var("CACHE_REDIS_URL") {
            config.cache.redis.url = url;
        }
        if let Some(prefix) = var("CACHE_REDIS_PREFIX") {
            config.cache.redis.prefix = prefix;
        }

        // JWT: a single key can be supplied through the environment
        if let Some(issuer) = var("JWT_ISSUER") {
            config.jwt.issuer = issuer;
        }
        if let Some(secret) = var("JWT_SECRET") {
            config.jwt.keys = vec![JwtKeyConfig {
                kid: var("JWT_KID").unwrap_or_else(default_kid),
                secret,
                retire_at: None,
            }];
        }
        if let Some(ttl) = var("JWT_DEFAULT_TTL_SECS") {
            config.jwt.default_ttl_secs = parse_var("JWT_DEFAULT_TTL_SECS", &ttl)?;
        }
        if let Some(ttl) = var("JWT_MAX_TTL_SECS") {
            config.jwt.max_ttl_secs = parse_var("JWT_MAX_TTL_SECS", &ttl)?;
        }

        // Identity provider
        if let Some(enabled) = var("IDP_ENABLED") {
            config.identity_provider.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(base_url) = var("IDP_BASE_URL") {
            config.identity_provider.base_url = Some(base_url);
        }
        if let Some(realm) = var("IDP_REALM") {
            config.identity_provider.realm = realm;
        }
        if let Some(client_id) = var("IDP_CLIENT_ID") {
            config.identity_provider.client_id = client_id;
        }
        if let Some(client_secret) = var("IDP_CLIENT_SECRET") {
            config.identity_provider.client_secret = Some(client_secret);
        }

        // Metrics
        if let Some(enabled) = var("METRICS_ENABLED") {
            config.metrics.enabled = enabled.parse().unwrap_or(true);
        }
        if let Some(path) = var("METRICS_PATH") {
            config.metrics.path = path;
        }

        // Rate limiting
        if let Some(secs) = var("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit.window_secs = parse_var("RATE_LIMIT_WINDOW_SECS", &secs)?;
        }
        if let Some(max) = var("RATE_LIMIT_MAX_ATTEMPTS_PER_IDENTITY") {
            config.rate_limit.max_attempts_per_identity =
                parse_var("RATE_LIMIT_MAX_ATTEMPTS_PER_IDENTITY", &max)?;
        }
        if let Some(max) = var("RATE_LIMIT_MAX_ATTEMPTS_PER_SOURCE") {
            config.rate_limit.max_attempts_per_source =
                parse_var("RATE_LIMIT_MAX_ATTEMPTS_PER_SOURCE", &max)?;
        }

        // Auth core
        if let Some(ms) = var("AUTH_CALL_TIMEOUT_MS") {
            config.auth.call_timeout_ms = parse_var("AUTH_CALL_TIMEOUT_MS", &ms)?;
        }
        if let Some(expose) = var("AUTH_EXPOSE_TOKEN_ERROR_KINDS") {
            config.auth.expose_token_error_kinds = expose.parse().unwrap_or(false);
        }

        // OTEL
        if let Some(enabled) = var("OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(endpoint) = var("OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.algorithm != TOKEN_ALGORITHM {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.algorithm: unsupported algorithm '{}', only {} is available",
                self.jwt.algorithm, TOKEN_ALGORITHM
            )));
        }
        if self.jwt.issuer.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }
        // Builds the keyring once to reuse its key checks
        self.keyring()?;

        if self.jwt.default_ttl_secs == 0 || self.jwt.max_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "jwt: token lifetimes must be greater than zero".to_string(),
            ));
        }
        if self.jwt.default_ttl_secs > self.jwt.max_ttl_secs {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.default_ttl_secs ({}) exceeds jwt.max_ttl_secs ({})",
                self.jwt.default_ttl_secs, self.jwt.max_ttl_secs
            )));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.max_attempts_per_identity == 0
            || self.rate_limit.max_attempts_per_source == 0
        {
            return Err(ConfigError::InvalidValue(
                "rate_limit: attempt maxima must be greater than zero".to_string(),
            ));
        }

        if self.auth.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "server.request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidValue(format!(
                "logging.format: expected 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }

        if self.identity_provider.enabled {
            match self.identity_provider.base_url.as_deref() {
                Some(url) if !url.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::MissingRequired(
                        "identity_provider.base_url".to_string(),
                    ))
                }
            }
            if self.identity_provider.kind != "keycloak" {
                return Err(ConfigError::InvalidValue(format!(
                    "identity_provider.kind: unknown provider '{}'",
                    self.identity_provider.kind
                )));
            }
        }

        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "metrics.path must start with '/', got '{}'",
                self.metrics.path
            )));
        }

        Ok(())
    }

    /// Build the signing keyring from `jwt.keys`
    pub fn keyring(&self) -> Result<Arc<Keyring>, ConfigError> {
        let keys = self
            .jwt
            .keys
            .iter()
            .map(|key| SigningKey::new(key.kid.clone(), key.secret.as_bytes(), key.retire_at))
            .collect::<Result<Vec<_>, _>>()
            .map_err(keyring_error)?;

        let keyring = Keyring::new(keys).map_err(keyring_error)?;
        keyring
            .ensure_signing_key_active(Utc::now())
            .map_err(keyring_error)?;

        Ok(Arc::new(keyring))
    }

    /// Settings for the token service
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            issuer: self.jwt.issuer.clone(),
            default_ttl: Duration::from_secs(self.jwt.default_ttl_secs),
            max_ttl: Duration::from_secs(self.jwt.max_ttl_secs),
            call_timeout: self.auth.call_timeout(),
        }
    }

    /// Settings for the login rate limiter
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.rate_limit.window_secs),
            max_attempts_per_identity: self.rate_limit.max_attempts_per_identity,
            max_attempts_per_source: self.rate_limit.max_attempts_per_source,
            call_timeout: self.auth.call_timeout(),
        }
    }

    /// Settings for the authentication core
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            call_timeout: self.auth.call_timeout(),
        }
    }

    /// Settings for the Redis cache backend
    pub fn redis_cache_config(&self) -> RedisCacheConfig {
        RedisCacheConfig {
            url: self.cache.redis.url.clone(),
            prefix: self.cache.redis.prefix.clone(),
            ..Default::default()
        }
    }

    /// Settings for the Keycloak bridge, when federation is enabled
    pub fn keycloak_config(&self) -> Option<KeycloakConfig> {
        let idp = &self.identity_provider;
        if !idp.enabled {
            return None;
        }

        Some(KeycloakConfig {
            base_url: idp.base_url.clone()?,
            realm: idp.realm.clone(),
            client_id: idp.client_id.clone(),
            client_secret: idp.client_secret.clone(),
            timeout_secs: idp.timeout_secs,
        })
    }
}

fn keyring_error(e: KeyringError) -> ConfigError {
    match e {
        KeyringError::Empty => ConfigError::MissingRequired("jwt.keys".to_string()),
        other => ConfigError::InvalidValue(format!("jwt.keys: {}", other)),
    }
}

fn parse_var<T: std::str::FromStr>(suffix: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::Parse(format!("Invalid value for {}{}: '{}'", ENV_PREFIX, suffix, value))
    })
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Credential store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// SQLite database location, a path or `sqlite://path`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl DatabaseConfig {
    /// Filesystem path (or `:memory:`) with any `sqlite://` scheme removed
    pub fn path(&self) -> &str {
        self.url.strip_prefix("sqlite://").unwrap_or(&self.url)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:///data/db/auth-service.db".to_string()
}

fn default_pool_size() -> usize {
    4
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process cache, single instance only
    #[default]
    Memory,
    /// Shared Redis cache
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Which cache backend to use
    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis settings, used when `backend` is `redis`
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Key prefix
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_redis_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_prefix() -> String {
    "auth-service:".to_string()
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtConfig {
    /// `iss` claim written into and required from every token
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Signing algorithm
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Signing keys, newest first; the first key signs
    #[serde(default)]
    pub keys: Vec<JwtKeyConfig>,

    /// Lifetime used when a caller asks for none
    #[serde(default = "default_token_ttl")]
    pub default_ttl_secs: u64,

    /// Upper bound on any token lifetime
    #[serde(default = "default_max_token_ttl")]
    pub max_ttl_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            algorithm: default_algorithm(),
            keys: Vec::new(),
            default_ttl_secs: default_token_ttl(),
            max_ttl_secs: default_max_token_ttl(),
        }
    }
}

fn default_issuer() -> String {
    "auth-service".to_string()
}

fn default_algorithm() -> String {
    TOKEN_ALGORITHM.to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_max_token_ttl() -> u64 {
    86400
}

fn default_kid() -> String {
    "default".to_string()
}

/// One signing key
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtKeyConfig {
    /// Key identifier placed in the token header
    #[serde(default = "default_kid")]
    pub kid: String,

    /// Shared HMAC secret
    pub secret: String,

    /// Time after which tokens signed with this key stop verifying
    #[serde(default)]
    pub retire_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for JwtKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeyConfig")
            .field("kid", &self.kid)
            .field("secret", &"<redacted>")
            .field("retire_at", &self.retire_at)
            .finish()
    }
}

/// Federated identity provider configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityProviderConfig {
    /// Whether federated login is available
    #[serde(default)]
    pub enabled: bool,

    /// Provider implementation
    #[serde(default = "default_idp_kind")]
    pub kind: String,

    /// Provider base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Realm name
    #[serde(default = "default_idp_realm")]
    pub realm: String,

    /// OAuth client id
    #[serde(default = "default_idp_client_id")]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default = "default_idp_timeout")]
    pub timeout_secs: u64,
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: default_idp_kind(),
            base_url: None,
            realm: default_idp_realm(),
            client_id: default_idp_client_id(),
            client_secret: None,
            timeout_secs: default_idp_timeout(),
        }
    }
}

impl std::fmt::Debug for IdentityProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProviderConfig")
            .field("enabled", &self.enabled)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_idp_kind() -> String {
    "keycloak".to_string()
}

fn default_idp_realm() -> String {
    "master".to_string()
}

fn default_idp_client_id() -> String {
    "auth-service".to_string()
}

fn default_idp_timeout() -> u64 {
    5
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Whether the metrics snapshot is served
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Path of the metrics snapshot
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Login rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthRateLimitConfig {
    /// Fixed window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Attempts allowed per identity and window
    #[serde(default = "default_max_per_identity")]
    pub max_attempts_per_identity: u64,

    /// Attempts allowed per source address and window
    #[serde(default = "default_max_per_source")]
    pub max_attempts_per_source: u64,
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_attempts_per_identity: default_max_per_identity(),
            max_attempts_per_source: default_max_per_source(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_per_identity() -> u64 {
    5
}

fn default_max_per_source() -> u64 {
    20
}

/// Authentication core configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Deadline for each store, cache and provider call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Return the precise token error kind instead of `unauthorized`
    #[serde(default)]
    pub expose_token_error_kinds: bool,
}

impl AuthConfig {
    /// Per-call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            expose_token_error_kinds: false,
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    500
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether trace export is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "auth-service".to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in the format ${VAR_NAME}
///
/// Unset variables expand to an empty string.
fn expand_env_vars(input: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SECRET_A: &str = "0123456789abcdef0123456789abcdef";
    const SECRET_B: &str = "fedcba9876543210fedcba9876543210";

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.jwt.keys = vec![JwtKeyConfig {
            kid: "k1".to_string(),
            secret: SECRET_A.to_string(),
            retire_at: None,
        }];
        config
    }

    // Test 1: Parse complete YAML configuration
    #[test]
    fn test_parse_complete_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090
  request_timeout_secs: 5

logging:
  level: "debug"
  format: "pretty"

database:
  url: "sqlite:///tmp/auth.db"
  pool_size: 2

cache:
  backend: redis
  redis:
    url: "redis://cache:6379"
    prefix: "auth:"

jwt:
  issuer: "https://auth.example.com"
  algorithm: "HS256"
  keys:
    - kid: "2024-06"
      secret: "0123456789abcdef0123456789abcdef"
    - kid: "2024-01"
      secret: "fedcba9876543210fedcba9876543210"
      retire_at: "2024-07-01T00:00:00Z"
  default_ttl_secs: 900
  max_ttl_secs: 7200

identity_provider:
  enabled: true
  kind: keycloak
  base_url: "https://sso.example.com"
  realm: "corp"
  client_id: "auth"
  client_secret: "client-secret"

metrics:
  enabled: true
  path: "/internal/metrics"

rate_limit:
  window_secs: 120
  max_attempts_per_identity: 3
  max_attempts_per_source: 50

auth:
  call_timeout_ms: 250
  expose_token_error_kinds: true

otel:
  enabled: true
  endpoint: "http://localhost:4317"
  service_name: "auth-test"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.request_timeout_secs, 5);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");

        assert_eq!(config.database.path(), "/tmp/auth.db");
        assert_eq!(config.database.pool_size, 2);

        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis.url, "redis://cache:6379");
        assert_eq!(config.cache.redis.prefix, "auth:");

        assert_eq!(config.jwt.issuer, "https://auth.example.com");
        assert_eq!(config.jwt.keys.len(), 2);
        assert_eq!(config.jwt.keys[0].kid, "2024-06");
        assert!(config.jwt.keys[0].retire_at.is_none());
        assert_eq!(
            config.jwt.keys[1].retire_at.unwrap().to_rfc3339(),
            "2024-07-01T00:00:00+00:00"
        );
        assert_eq!(config.jwt.default_ttl_secs, 900);
        assert_eq!(config.jwt.max_ttl_secs, 7200);

        assert!(config.identity_provider.enabled);
        assert_eq!(
            config.identity_provider.base_url.as_deref(),
            Some("https://sso.example.com")
        );
        assert_eq!(config.identity_provider.realm, "corp");

        assert_eq!(config.metrics.path, "/internal/metrics");

        assert_eq!(config.rate_limit.window_secs, 120);
        assert_eq!(config.rate_limit.max_attempts_per_identity, 3);
        assert_eq!(config.rate_limit.max_attempts_per_source, 50);

        assert_eq!(config.auth.call_timeout_ms, 250);
        assert!(config.auth.expose_token_error_kinds);

        assert!(config.otel.enabled);
        assert_eq!(config.otel.service_name, "auth-test");

        assert!(config.validate().is_ok());
    }

    // Test 2: Default values are applied for missing fields
    #[test]
    fn test_default_values_applied() {
        let yaml = r#"
server:
  port: 3000
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.request_timeout_secs, 10);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "json");

        assert_eq!(config.database.path(), "/data/db/auth-service.db");
        assert_eq!(config.database.pool_size, 4);

        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.redis.prefix, "auth-service:");

        assert_eq!(config.jwt.issuer, "auth-service");
        assert_eq!(config.jwt.algorithm, "HS256");
        assert!(config.jwt.keys.is_empty());
        assert_eq!(config.jwt.default_ttl_secs, 3600);
        assert_eq!(config.jwt.max_ttl_secs, 86400);

        assert!(!config.identity_provider.enabled);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.path, "/metrics");

        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.max_attempts_per_identity, 5);
        assert_eq!(config.rate_limit.max_attempts_per_source, 20);

        assert_eq!(config.auth.call_timeout(), Duration::from_millis(500));
        assert!(!config.auth.expose_token_error_kinds);

        assert!(!config.otel.enabled);
        assert_eq!(config.otel.service_name, "auth-service");
    }

    // Test 3: Environment variable expansion
    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("AUTH_TEST_JWT_SECRET", SECRET_A);
        std::env::set_var("AUTH_TEST_DB_URL", "/var/data/auth.db");

        let yaml = r#"
database:
  url: "${AUTH_TEST_DB_URL}"
jwt:
  keys:
    - kid: "env"
      secret: "${AUTH_TEST_JWT_SECRET}"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.database.path(), "/var/data/auth.db");
        assert_eq!(config.jwt.keys[0].secret, SECRET_A);

        std::env::remove_var("AUTH_TEST_JWT_SECRET");
        std::env::remove_var("AUTH_TEST_DB_URL");
    }

    // Test 4: from_lookup reads prefixed variables
    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("AUTH_SERVICE_SERVER_HOST", "localhost"),
            ("AUTH_SERVICE_SERVER_PORT", "9999"),
            ("AUTH_SERVICE_DATABASE_URL", ":memory:"),
            ("AUTH_SERVICE_CACHE_BACKEND", "redis"),
            ("AUTH_SERVICE_JWT_SECRET", SECRET_A),
            ("AUTH_SERVICE_JWT_KID", "env-key"),
            ("AUTH_SERVICE_RATE_LIMIT_MAX_ATTEMPTS_PER_IDENTITY", "3"),
            ("AUTH_SERVICE_AUTH_EXPOSE_TOKEN_ERROR_KINDS", "true"),
            ("AUTH_SERVICE_OTEL_ENABLED", "true"),
            ("AUTH_SERVICE_OTEL_ENDPOINT", "http://otel:4317"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.database.path(), ":memory:");
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.jwt.keys.len(), 1);
        assert_eq!(config.jwt.keys[0].kid, "env-key");
        assert_eq!(config.rate_limit.max_attempts_per_identity, 3);
        assert!(config.auth.expose_token_error_kinds);
        assert!(config.otel.enabled);
        assert_eq!(config.otel.endpoint, Some("http://otel:4317".to_string()));
        assert!(config.validate().is_ok());
    }

    // Test 5: Bad numeric environment values are parse errors
    #[test]
    fn test_from_lookup_invalid_number() {
        let result = Config::from_lookup(|name| {
            (name == "AUTH_SERVICE_SERVER_PORT").then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        let result = Config::from_lookup(|name| {
            (name == "AUTH_SERVICE_CACHE_BACKEND").then(|| "memcached".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    // Test 6: Parse error for invalid YAML
    #[test]
    fn test_parse_error_invalid_yaml() {
        let yaml = r#"
server:
  port: "not_a_number"
"#;

        let result = Config::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // Test 7: Load from file
    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 4000").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 4000);

        let missing = Config::from_file("/nonexistent/auth-service.yaml");
        assert!(matches!(missing, Err(ConfigError::FileRead(_))));
    }

    // Test 8: Validation requires at least one key
    #[test]
    fn test_validate_requires_keys() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingRequired("jwt.keys".to_string()))
        );
        assert!(valid_config().validate().is_ok());
    }

    // Test 9: Short secrets and duplicate kids are rejected
    #[test]
    fn test_validate_key_constraints() {
        let mut config = valid_config();
        config.jwt.keys[0].secret = "x".repeat(MIN_SECRET_BYTES - 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut config = valid_config();
        config.jwt.keys.push(JwtKeyConfig {
            kid: "k1".to_string(),
            secret: SECRET_B.to_string(),
            retire_at: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    // Test 10: The signing key must not already be retired
    #[test]
    fn test_validate_retired_signing_key() {
        let mut config = valid_config();
        config.jwt.keys[0].retire_at = Some(Utc::now() - chrono::Duration::days(1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue(
                "jwt.keys: signing key 'k1' is already retired".to_string()
            ))
        );
        assert!(config.keyring().is_err());

        // A retired key behind an active one is the rotation grace case
        let mut config = valid_config();
        config.jwt.keys.push(JwtKeyConfig {
            kid: "k0".to_string(),
            secret: SECRET_B.to_string(),
            retire_at: Some(Utc::now() - chrono::Duration::days(1)),
        });
        assert!(config.validate().is_ok());
    }

    // Test 11: Only HS256 is accepted
    #[test]
    fn test_validate_algorithm() {
        let mut config = valid_config();
        config.jwt.algorithm = "none".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    // Test 12: Lifetime and rate-limit bounds
    #[test]
    fn test_validate_numeric_bounds() {
        let mut config = valid_config();
        config.jwt.default_ttl_secs = 7200;
        config.jwt.max_ttl_secs = 3600;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.rate_limit.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.rate_limit.max_attempts_per_identity = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.rate_limit.max_attempts_per_source = 0;
        assert!(config.validate().is_err());
    }

    // Test 13: Enabled identity provider needs a base URL
    #[test]
    fn test_validate_identity_provider() {
        let mut config = valid_config();
        config.identity_provider.enabled = true;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired(
                "identity_provider.base_url".to_string()
            ))
        );
        assert!(config.keycloak_config().is_none());

        config.identity_provider.base_url = Some("https://sso.example.com".to_string());
        assert!(config.validate().is_ok());

        let keycloak = config.keycloak_config().unwrap();
        assert_eq!(keycloak.base_url, "https://sso.example.com");
        assert_eq!(keycloak.realm, "master");
    }

    // Test 14: Derived component settings
    #[test]
    fn test_component_configs() {
        let mut config = valid_config();
        config.auth.call_timeout_ms = 200;
        config.rate_limit.window_secs = 30;

        let token = config.token_config();
        assert_eq!(token.issuer, "auth-service");
        assert_eq!(token.default_ttl, Duration::from_secs(3600));
        assert_eq!(token.call_timeout, Duration::from_millis(200));

        let rate = config.rate_limit_config();
        assert_eq!(rate.window, Duration::from_secs(30));
        assert_eq!(rate.max_attempts_per_identity, 5);

        let keyring = config.keyring().unwrap();
        assert_eq!(keyring.kids(), vec!["k1"]);
    }

    // Test 15: Debug output hides secrets
    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = valid_config();
        config.identity_provider.client_secret = Some("client-secret-value".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains(SECRET_A));
        assert!(!debug.contains("client-secret-value"));
    }
}
