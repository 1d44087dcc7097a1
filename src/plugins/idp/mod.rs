//! External identity provider plugins
//!
//! Federated login delegates credential checks to a provider behind the
//! [`IdentityProvider`] trait. Keycloak is the only provider shipped.

pub mod keycloak;
pub mod traits;

pub use keycloak::{KeycloakConfig, KeycloakProvider};
pub use traits::IdentityProvider;

#[cfg(test)]
pub use traits::MockIdentityProvider;
