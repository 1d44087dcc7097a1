//! Domain models for auth-service
//!
//! This module contains the core domain models used throughout the application.

pub mod identity;
pub mod token;

// Re-export commonly used types
pub use identity::{ExternalIdentity, Identity, IdentityStatus};
pub use token::{
    Claims, ErrorResponse, IssuedToken, LoginRequest, LoginResponse, TokenHeader, TokenRequest,
    VerifyResponse, TOKEN_ALGORITHM,
};
