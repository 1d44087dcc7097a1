//! Authentication manager
//!
//! This module provides the main authentication interface for the application.
//! It runs the login flow (rate limit, credential lookup, secret check, token
//! issue) and fronts the token service for verification and revocation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::database::CredentialStore;
use crate::error::{AuthError, StoreError};
use crate::models::{Identity, IdentityStatus, IssuedToken};
use crate::otel::AuthMetrics;
use crate::plugins::idp::IdentityProvider;

use super::password::dummy_credential_hash;
use super::ratelimit::{RateLimitScope, RateLimiter};
use super::timeout::with_timeout;
use super::token::TokenService;

/// Identifier carried by the decoy identity used for timing equalization
const DECOY_IDENTIFIER: &str = "";

/// Configuration for the authentication manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Deadline for each credential store and identity provider call
    pub call_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(500),
        }
    }
}

/// Authentication manager
///
/// Owns no mutable state of its own: attempt counters live in the cache and
/// identities in the credential store, so one manager serves every request.
pub struct AuthManager<S: CredentialStore> {
    store: Arc<S>,
    tokens: TokenService,
    rate_limiter: RateLimiter,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    metrics: Arc<AuthMetrics>,
    config: ManagerConfig,
}

impl<S: CredentialStore> AuthManager<S> {
    /// Create a new authentication manager
    pub fn new(
        store: Arc<S>,
        tokens: TokenService,
        rate_limiter: RateLimiter,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            tokens,
            rate_limiter,
            identity_provider: None,
            metrics: Arc::new(AuthMetrics::default()),
            config,
        }
    }

    /// Enable federated login through `provider`
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Record outcomes on `metrics` instead of a private instance
    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Token service
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Login rate limiter
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Authentication metrics
    pub fn metrics(&self) -> &Arc<AuthMetrics> {
        &self.metrics
    }

    /// Whether federated login is configured
    pub fn has_identity_provider(&self) -> bool {
        self.identity_provider.is_some()
    }

    /// Authenticate against the credential store and issue a token
    ///
    /// Unknown, locked and disabled identities fail exactly like a wrong
    /// secret. The attempt counts against the rate limit before the store is
    /// touched.
    pub async fn authenticate(
        &self,
        identity_ref: &str,
        secret: &str,
        source: &str,
    ) -> Result<IssuedToken, AuthError> {
        let result = self.authenticate_local(identity_ref, secret, source).await;
        self.record_login("local", identity_ref, &result);
        result
    }

    async fn authenticate_local(
        &self,
        identity_ref: &str,
        secret: &str,
        source: &str,
    ) -> Result<IssuedToken, AuthError> {
        validate_login(identity_ref, secret)?;
        self.enforce_rate_limit(identity_ref, source).await?;

        let lookup = with_timeout(
            self.config.call_timeout,
            "store.find_by_identifier",
            self.store.find_by_identifier(identity_ref),
        )
        .await;
        let identity = match lookup {
            Ok(identity) => identity,
            Err(AuthError::InvalidCredentials) => {
                self.verify_decoy_secret(secret).await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if !identity.is_active() {
            debug!(
                identity = identity_ref,
                status = %identity.status,
                "Login refused for inactive identity"
            );
            self.verify_decoy_secret(secret).await;
            return Err(AuthError::InvalidCredentials);
        }

        let matches = with_timeout(
            self.config.call_timeout,
            "store.verify_secret",
            async { Ok::<_, StoreError>(self.store.verify_secret(&identity, secret).await) },
        )
        .await?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        self.rate_limiter
            .reset(RateLimitScope::Identity, identity_ref)
            .await?;

        self.tokens
            .issue(identity_ref, self.tokens.config().default_ttl)
            .await
    }

    /// Authenticate through the external identity provider and issue a token
    ///
    /// Shares the rate-limit counters of [`AuthManager::authenticate`], so
    /// switching login routes does not reset an identity's budget. The token
    /// subject is the provider's subject identifier.
    pub async fn authenticate_federated(
        &self,
        identity_ref: &str,
        secret: &str,
        source: &str,
    ) -> Result<IssuedToken, AuthError> {
        let result = self
            .authenticate_with_provider(identity_ref, secret, source)
            .await;
        self.record_login("federated", identity_ref, &result);
        result
    }

    async fn authenticate_with_provider(
        &self,
        identity_ref: &str,
        secret: &str,
        source: &str,
    ) -> Result<IssuedToken, AuthError> {
        let provider = self.identity_provider.as_ref().ok_or_else(|| {
            AuthError::InvalidRequest("federated login is not configured".to_string())
        })?;

        validate_login(identity_ref, secret)?;
        self.enforce_rate_limit(identity_ref, source).await?;

        let external = with_timeout(
            self.config.call_timeout,
            "idp.authenticate",
            provider.authenticate(identity_ref, secret),
        )
        .await?;

        self.rate_limiter
            .reset(RateLimitScope::Identity, identity_ref)
            .await?;

        debug!(
            identity = identity_ref,
            provider = %external.provider,
            subject = %external.subject,
            "Federated identity resolved"
        );

        self.tokens
            .issue(&external.subject, self.tokens.config().default_ttl)
            .await
    }

    /// Verify a token and return its subject
    pub async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let result = self.tokens.verify(token).await;
        match &result {
            Ok(_) => self.metrics.record_verification("success"),
            Err(e) => self.metrics.record_verification(e.kind()),
        }
        result
    }

    /// Revoke a token by identifier
    pub async fn revoke(&self, token_id: &str) -> Result<(), AuthError> {
        self.tokens.revoke(token_id).await?;
        self.metrics.record_revocation();
        Ok(())
    }

    /// Revoke a presented token
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        self.tokens.revoke_token(token).await?;
        self.metrics.record_revocation();
        Ok(())
    }

    /// Lock, unlock or disable an identity
    pub async fn set_identity_status(
        &self,
        identifier: &str,
        status: IdentityStatus,
    ) -> Result<(), AuthError> {
        with_timeout(
            self.config.call_timeout,
            "store.set_status",
            self.store.set_status(identifier, status),
        )
        .await?;

        info!(identity = identifier, status = %status, "Identity status changed");
        Ok(())
    }

    /// Run a secret check against a hash nothing matches
    ///
    /// Unknown and inactive identities then take as long to refuse as a
    /// wrong secret. The outcome is discarded.
    async fn verify_decoy_secret(&self, secret: &str) {
        let decoy = Identity::new(DECOY_IDENTIFIER, dummy_credential_hash());
        let _ = with_timeout(self.config.call_timeout, "store.verify_secret", async {
            Ok::<_, StoreError>(self.store.verify_secret(&decoy, secret).await)
        })
        .await;
    }

    /// Count the attempt against both the identity and the source
    ///
    /// Both counters are incremented before either is checked, so a request
    /// that trips one limit still counts against the other.
    async fn enforce_rate_limit(&self, identity_ref: &str, source: &str) -> Result<(), AuthError> {
        let by_identity = self
            .rate_limiter
            .hit(RateLimitScope::Identity, identity_ref)
            .await?;
        let by_source = self.rate_limiter.hit(RateLimitScope::Source, source).await?;

        for (scope, decision) in [
            (RateLimitScope::Identity, by_identity),
            (RateLimitScope::Source, by_source),
        ] {
            if !decision.allowed() {
                warn!(
                    identity = identity_ref,
                    source = source,
                    scope = %scope,
                    retry_after_secs = decision.retry_after.as_secs(),
                    "Login rate limited"
                );
                self.metrics.record_rate_limited(&scope.to_string());
                return Err(AuthError::RateLimited);
            }
        }

        Ok(())
    }

    fn record_login(
        &self,
        method: &str,
        identity_ref: &str,
        result: &Result<IssuedToken, AuthError>,
    ) {
        match result {
            Ok(issued) => {
                info!(
                    method = method,
                    identity = identity_ref,
                    subject = %issued.subject,
                    token_id = %issued.token_id,
                    "Login succeeded"
                );
                self.metrics.record_login(method, "success");
            }
            Err(e) => {
                debug!(
                    method = method,
                    identity = identity_ref,
                    error_kind = e.kind(),
                    "Login failed"
                );
                self.metrics.record_login(method, e.kind());
            }
        }
    }
}

fn validate_login(identity_ref: &str, secret: &str) -> Result<(), AuthError> {
    if identity_ref.trim().is_empty() {
        return Err(AuthError::InvalidRequest(
            "identity reference must not be empty".to_string(),
        ));
    }
    if secret.is_empty() {
        return Err(AuthError::InvalidRequest(
            "secret must not be empty".to_string(),
        ));
    }
    Ok(())
}
