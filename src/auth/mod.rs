//! Authentication system for auth-service
//!
//! This module provides the authentication core:
//! - Credential hashing and verification
//! - Signed token issue, verification and revocation
//! - Fixed-window rate limiting of login attempts
//! - The login flow tying these to the credential store

pub mod keys;
pub mod manager;
pub mod password;
pub mod ratelimit;
pub mod timeout;
pub mod token;

pub use keys::{Keyring, KeyringError, SigningKey};
pub use manager::{AuthManager, ManagerConfig};
pub use password::{
    dummy_credential_hash, generate_token_id, hash_secret, verify_secret, HashError,
};
pub use ratelimit::{RateLimitConfig, RateLimitDecision, RateLimitScope, RateLimiter};
pub use token::{TokenConfig, TokenService};
