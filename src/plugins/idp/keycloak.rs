//! Keycloak identity provider
//!
//! Authenticates users with the OpenID Connect resource-owner password grant
//! and resolves the subject through the realm's userinfo endpoint.
//!
//! # Endpoints
//!
//! - Token: `{base_url}/realms/{realm}/protocol/openid-connect/token`
//! - Userinfo: `{base_url}/realms/{realm}/protocol/openid-connect/userinfo`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::IdpError;
use crate::models::ExternalIdentity;

use super::IdentityProvider;

/// Keycloak provider configuration
#[derive(Clone)]
pub struct KeycloakConfig {
    /// Server base URL, without a trailing slash
    pub base_url: String,
    /// Realm name
    pub realm: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret for confidential clients
    pub client_secret: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            realm: "master".to_string(),
            client_id: "auth-service".to_string(),
            client_secret: None,
            timeout_secs: 5,
        }
    }
}

impl std::fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    preferred_username: Option<String>,
}

/// Keycloak identity provider
#[derive(Debug)]
pub struct KeycloakProvider {
    config: KeycloakConfig,
    client: Client,
}

impl KeycloakProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: KeycloakConfig) -> Result<Self, IdpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IdpError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.realm,
            name
        )
    }

    async fn request_access_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, IdpError> {
        let mut form = vec![
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("username", username),
            ("password", password),
            ("scope", "openid"),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .client
            .post(self.endpoint("token"))
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| IdpError::InvalidResponse(e.to_string()))?;
                Ok(body.access_token)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                debug!(provider = "keycloak", "Password grant rejected");
                Err(IdpError::Rejected)
            }
            status => {
                warn!(provider = "keycloak", status = %status, "Token endpoint failed");
                Err(IdpError::Unavailable(format!(
                    "token endpoint returned {}",
                    status
                )))
            }
        }
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, IdpError> {
        let response = self
            .client
            .get(self.endpoint("userinfo"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(IdpError::Unavailable(format!(
                "userinfo endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(IdpError::InvalidResponse(format!(
                "userinfo endpoint returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IdpError::InvalidResponse(e.to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> IdpError {
    if e.is_timeout() {
        IdpError::Unavailable("request timed out".to_string())
    } else {
        IdpError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl IdentityProvider for KeycloakProvider {
    fn name(&self) -> &str {
        "keycloak"
    }

    async fn authenticate(
        &self,
        identity_ref: &str,
        secret: &str,
    ) -> Result<ExternalIdentity, IdpError> {
        let access_token = self.request_access_token(identity_ref, secret).await?;
        let userinfo = self.fetch_userinfo(&access_token).await?;

        if userinfo.sub.is_empty() {
            return Err(IdpError::InvalidResponse("empty subject".to_string()));
        }

        Ok(ExternalIdentity {
            provider: self.name().to_string(),
            subject: userinfo.sub,
            username: userinfo.preferred_username,
        })
    }
}
