//! Plugins for auth-service
//!
//! - `cache`: session, revocation and rate-limit state
//! - `idp`: external identity providers for federated login

pub mod cache;
pub mod idp;
