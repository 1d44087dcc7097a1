//! Credential store for auth-service
//!
//! This module defines the credential store trait and its SQLite implementation.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteCredentialStore;

use async_trait::async_trait;

use crate::auth::password;
use crate::error::StoreError;
use crate::models::{Identity, IdentityStatus};

/// Credential store trait
///
/// The authentication core treats the store as an opaque capability. It uses
/// `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an identity by its identifier
    ///
    /// Returns `StoreError::NotFound` when no such identity exists.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Identity, StoreError>;

    /// Check a cleartext secret against the identity's stored hash
    ///
    /// Argon2 is CPU-bound, so the default implementation runs it on the
    /// blocking pool rather than a runtime worker.
    async fn verify_secret(&self, identity: &Identity, secret: &str) -> bool {
        let hash = identity.credential_hash.clone();
        let secret = secret.to_string();

        tokio::task::spawn_blocking(move || password::verify_secret(&secret, &hash))
            .await
            .unwrap_or(false)
    }

    /// Register a new identity
    ///
    /// Returns `StoreError::Conflict` if the identifier is taken.
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Change an identity's status (lock, unlock, disable)
    async fn set_status(&self, identifier: &str, status: IdentityStatus) -> Result<(), StoreError>;
}
