//! auth-service - A token-issuing authentication service
//!
//! This crate verifies identity credentials against a credential store,
//! issues signed bearer tokens, and verifies or revokes them on request.
//! Login attempts are rate limited and can be delegated to an external
//! identity provider.

pub mod auth;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod otel;
pub mod plugins;
pub mod server;
