//! Identity provider plugin trait definition
//!
//! An identity provider authenticates a user against an external system and
//! returns the subject it asserts. The authentication core depends only on this
//! trait; which provider is wired in is decided at startup.

use async_trait::async_trait;

use crate::error::IdpError;
use crate::models::ExternalIdentity;

/// Trait for external identity providers
///
/// Implementations must map a credential rejection to `IdpError::Rejected` and
/// any transport failure to `IdpError::Unavailable` so the caller can tell an
/// outage apart from a wrong password.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Get the provider name (e.g., "keycloak")
    fn name(&self) -> &str;

    /// Authenticate a user with the provider
    async fn authenticate(
        &self,
        identity_ref: &str,
        secret: &str,
    ) -> Result<ExternalIdentity, IdpError>;
}
