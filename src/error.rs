//! Application error types for auth-service
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Authentication-related errors
///
/// This is the taxonomy surfaced to the HTTP layer. Infrastructure failures
/// are folded into `ServiceUnavailable` or `InternalError` before they get here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown identity, disabled identity or wrong secret
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Rate limited due to too many attempts
    #[error("Rate limited: too many attempts")]
    RateLimited,

    /// Token is past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// Token structure or signature is invalid
    #[error("Token malformed")]
    TokenMalformed,

    /// Token identifier is in the revocation cache
    #[error("Token revoked")]
    TokenRevoked,

    /// A backing store, cache or identity provider is unreachable or timed out
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Unexpected failure
    #[error("Internal error")]
    InternalError,

    /// Request failed input validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthError {
    /// Stable machine-readable kind used in error responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::RateLimited => "rate_limited",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::ServiceUnavailable => "service_unavailable",
            AuthError::InternalError => "internal_error",
            AuthError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Whether this error concerns a presented token
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired | AuthError::TokenMalformed | AuthError::TokenRevoked
        )
    }
}

/// Cache-related errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache backend cannot be reached
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be interpreted
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// Redis protocol or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl CacheError {
    /// Returns true if the failure is a transport problem
    pub fn is_transport(&self) -> bool {
        match self {
            CacheError::Unavailable(_) => true,
            CacheError::Serialization(_) => false,
            CacheError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
        }
    }
}

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Identity not found
    #[error("Record not found")]
    NotFound,

    /// Store is unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Identity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection worker error
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),
}

/// External identity provider errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdpError {
    /// Provider rejected the credentials
    #[error("Identity provider rejected credentials")]
    Rejected,

    /// Provider could not be reached
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with something we cannot interpret
    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        if err.is_transport() {
            AuthError::ServiceUnavailable
        } else {
            AuthError::InternalError
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::InvalidCredentials,
            StoreError::Unavailable(_) | StoreError::Connection(_) => {
                AuthError::ServiceUnavailable
            }
            StoreError::Sqlite(ref e) if is_busy(e) => AuthError::ServiceUnavailable,
            StoreError::Sqlite(_) | StoreError::Conflict(_) => AuthError::InternalError,
        }
    }
}

/// Whether SQLite gave up on a busy or locked database
///
/// These clear once the competing writer finishes, unlike other SQLite failures.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

impl From<IdpError> for AuthError {
    fn from(err: IdpError) -> Self {
        match err {
            IdpError::Rejected => AuthError::InvalidCredentials,
            IdpError::Unavailable(_) => AuthError::ServiceUnavailable,
            IdpError::InvalidResponse(_) => AuthError::InternalError,
        }
    }
}

/// Application-level error type
///
/// Aggregates all domain-specific error types for startup and tooling paths.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Credential store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Identity provider error
    #[error("Identity provider error: {0}")]
    Idp(#[from] IdpError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
