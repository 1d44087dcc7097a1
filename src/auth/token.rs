//! Token issuing, verification and revocation
//!
//! Tokens are compact HS256 JWTs: `base64url(header).base64url(claims).base64url(mac)`.
//! The MAC is checked before any claim is decoded. Revocation is tracked in the
//! cache by token identifier, so issued tokens are never mutated.
//!
//! Cache keys:
//! - `session:{jti}`: expiry in unix seconds, lives as long as the token
//! - `revoked:{jti}`: revocation marker, lives for the token's remaining validity

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::error::AuthError;
use crate::models::{Claims, IssuedToken, TokenHeader, TOKEN_ALGORITHM};
use crate::plugins::cache::CachePlugin;

use super::keys::Keyring;
use super::password::generate_token_id;
use super::timeout::with_timeout;

/// Configuration for the token service
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Value of the `iss` claim; tokens from other issuers are rejected
    pub issuer: String,

    /// Lifetime used when the caller does not ask for one
    pub default_ttl: Duration,

    /// Upper bound on any token lifetime
    pub max_ttl: Duration,

    /// Deadline for each cache call
    pub call_timeout: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "auth-service".to_string(),
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            call_timeout: Duration::from_millis(500),
        }
    }
}

/// Only the header fields needed to pick a verification key
#[derive(Deserialize)]
struct HeaderFields {
    alg: String,
    kid: String,
}

fn session_key(token_id: &str) -> String {
    format!("session:{}", token_id)
}

fn revoked_key(token_id: &str) -> String {
    format!("revoked:{}", token_id)
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|_| AuthError::InternalError)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::TokenMalformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::TokenMalformed)
}

/// Issues, verifies and revokes signed tokens
pub struct TokenService {
    keyring: Arc<Keyring>,
    cache: Arc<dyn CachePlugin>,
    clock: SharedClock,
    config: TokenConfig,
}

impl TokenService {
    /// Create a new token service
    pub fn new(
        keyring: Arc<Keyring>,
        cache: Arc<dyn CachePlugin>,
        clock: SharedClock,
        config: TokenConfig,
    ) -> Self {
        Self {
            keyring,
            cache,
            clock,
            config,
        }
    }

    /// Token service configuration
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Lifetime actually granted for a requested `ttl`
    ///
    /// Zero means the default lifetime; anything above the maximum is clamped.
    pub fn effective_ttl(&self, ttl: Duration) -> Duration {
        let secs = if ttl.as_secs() == 0 {
            self.config.default_ttl.as_secs()
        } else {
            ttl.as_secs()
        };
        Duration::from_secs(secs.min(self.config.max_ttl.as_secs()).max(1))
    }

    /// Issue a token for `identity_ref` valid for `ttl`
    pub async fn issue(
        &self,
        identity_ref: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, AuthError> {
        if identity_ref.is_empty() {
            return Err(AuthError::InvalidRequest(
                "identity reference must not be empty".to_string(),
            ));
        }

        let ttl = self.effective_ttl(ttl);
        let now = self.clock.now();
        let iat = now.timestamp();
        let exp = iat + ttl.as_secs() as i64;

        let key = self.keyring.signing_key();
        let claims = Claims {
            sub: identity_ref.to_string(),
            iss: self.config.issuer.clone(),
            iat,
            exp,
            jti: generate_token_id(),
        };

        let signing_input = format!(
            "{}.{}",
            encode_segment(&TokenHeader::hs256(key.kid()))?,
            encode_segment(&claims)?
        );
        let signature = URL_SAFE_NO_PAD.encode(key.sign(signing_input.as_bytes()));
        let token = format!("{}.{}", signing_input, signature);

        with_timeout(
            self.config.call_timeout,
            "cache.set_session",
            self.cache
                .set_with_ttl(&session_key(&claims.jti), &exp.to_string(), ttl),
        )
        .await?;

        debug!(
            subject = %claims.sub,
            token_id = %claims.jti,
            kid = key.kid(),
            ttl_secs = ttl.as_secs(),
            "Issued token"
        );

        Ok(IssuedToken {
            token,
            token_id: claims.jti.clone(),
            subject: claims.sub.clone(),
            issued_at: DateTime::from_timestamp(iat, 0).unwrap_or(now),
            expires_at: claims.expires_at(),
        })
    }

    /// Verify a token and return its subject
    pub async fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.verify_claims(token).await.map(|claims| claims.sub)
    }

    /// Verify a token and return all of its claims
    pub async fn verify_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let now = self.clock.now();
        let claims = self.decode_signed(token, now)?;

        if claims.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }

        let revoked = with_timeout(
            self.config.call_timeout,
            "cache.get_revoked",
            self.cache.get(&revoked_key(&claims.jti)),
        )
        .await?;
        if revoked.is_some() {
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Revoke a token by its identifier
    ///
    /// The revocation marker lives for the token's remaining validity, read from
    /// its session entry. Without a session entry the maximum lifetime is used,
    /// which bounds the remaining life of any token. Revoking twice is harmless.
    pub async fn revoke(&self, token_id: &str) -> Result<(), AuthError> {
        if token_id.is_empty() {
            return Err(AuthError::InvalidRequest(
                "token identifier must not be empty".to_string(),
            ));
        }

        let session = with_timeout(
            self.config.call_timeout,
            "cache.get_session",
            self.cache.get(&session_key(token_id)),
        )
        .await?;

        let now = self.clock.now();
        let ttl = match session.and_then(|value| value.parse::<i64>().ok()) {
            Some(exp) => {
                let remaining = exp - now.timestamp();
                if remaining <= 0 {
                    debug!(token_id = token_id, "Token already expired, nothing to revoke");
                    return Ok(());
                }
                Duration::from_secs(remaining as u64)
            }
            None => self.config.max_ttl,
        };

        self.write_revocation(token_id, ttl).await
    }

    /// Revoke the token itself rather than an identifier
    ///
    /// The signature must be valid. Revoking an expired token is a no-op.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        let claims = self.decode_signed(token, now)?;

        let remaining = claims.exp - now.timestamp();
        if remaining <= 0 {
            debug!(token_id = %claims.jti, "Token already expired, nothing to revoke");
            return Ok(());
        }

        self.write_revocation(&claims.jti, Duration::from_secs(remaining as u64))
            .await
    }

    async fn write_revocation(&self, token_id: &str, ttl: Duration) -> Result<(), AuthError> {
        with_timeout(
            self.config.call_timeout,
            "cache.set_revoked",
            self.cache.set_with_ttl(&revoked_key(token_id), "1", ttl),
        )
        .await?;

        info!(token_id = token_id, ttl_secs = ttl.as_secs(), "Token revoked");
        Ok(())
    }

    /// Check structure, key and MAC, then decode the claims
    fn decode_signed(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (header_segment, payload_segment, signature_segment) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(AuthError::TokenMalformed),
            };

        let header: HeaderFields = decode_segment(header_segment)?;
        if header.alg != TOKEN_ALGORITHM {
            debug!(alg = %header.alg, "Rejected token with unsupported algorithm");
            return Err(AuthError::TokenMalformed);
        }

        let key = self
            .keyring
            .verification_key(&header.kid, now)
            .ok_or(AuthError::TokenMalformed)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|_| AuthError::TokenMalformed)?;
        let signing_input = &token[..header_segment.len() + 1 + payload_segment.len()];
        if !key.verify(signing_input.as_bytes(), &signature) {
            return Err(AuthError::TokenMalformed);
        }

        // Only now is the payload trusted enough to parse
        let claims: Claims = decode_segment(payload_segment)?;
        if claims.iss != self.config.issuer {
            return Err(AuthError::TokenMalformed);
        }

        Ok(claims)
    }
}
