//! Token-related domain models
//!
//! This module defines the signed token header and claims, the issued token
//! handed back to callers, and the request/response bodies of the auth API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only signing algorithm accepted
pub const TOKEN_ALGORITHM: &str = "HS256";

/// Token header, the first segment of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm
    pub alg: String,

    /// Token type
    pub typ: String,

    /// Identifier of the signing key
    pub kid: String,
}

impl TokenHeader {
    /// Header for an HS256 token signed by the given key
    pub fn hs256(kid: impl Into<String>) -> Self {
        Self {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

/// Token claims, the second segment of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity identifier)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Issued at, unix seconds
    pub iat: i64,

    /// Expiry, unix seconds
    pub exp: i64,

    /// Unique token identifier
    pub jti: String,
}

impl Claims {
    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether the token is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// A freshly issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Encoded token string
    pub token: String,

    /// Unique token identifier (`jti`)
    pub token_id: String,

    /// Subject the token was issued to
    pub subject: String,

    /// When the token was issued
    pub issued_at: DateTime<Utc>,

    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

/// Login request body
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Identity identifier
    pub identity_ref: String,

    /// Cleartext secret
    pub secret: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("identity_ref", &self.identity_ref)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Login response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Encoded token
    pub token: String,

    /// Expiry timestamp
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
        }
    }
}

/// Body carrying a token for verification or revocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Encoded token
    pub token: String,
}

/// Verification response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Subject of the verified token
    pub identity_ref: String,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Stable error kind
    pub error_kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hs256_header() {
        let header = TokenHeader::hs256("k1");
        assert_eq!(header.alg, "HS256");
        assert_eq!(header.typ, "JWT");
        assert_eq!(header.kid, "k1");
    }

    #[test]
    fn test_claims_expiry_boundary() {
        let now = Utc::now();
        let claims = Claims {
            sub: "bob".to_string(),
            iss: "auth-service".to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + 10,
            jti: "id".to_string(),
        };

        assert!(!claims.is_expired_at(now));
        assert!(claims.is_expired_at(now + chrono::Duration::seconds(10)));
        assert_eq!(claims.expires_at().timestamp(), now.timestamp() + 10);
    }

    #[test]
    fn test_login_request_uses_camel_case() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"identityRef":"alice","secret":"s3cret"}"#).unwrap();
        assert_eq!(request.identity_ref, "alice");
        assert_eq!(request.secret, "s3cret");
    }

    #[test]
    fn test_login_request_debug_redacts_secret() {
        let request = LoginRequest {
            identity_ref: "alice".to_string(),
            secret: "s3cret".to_string(),
        };
        let printed = format!("{:?}", request);
        assert!(!printed.contains("s3cret"));
    }

    #[test]
    fn test_login_response_serialization() {
        let response = LoginResponse {
            token: "a.b.c".to_string(),
            expires_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["token"], "a.b.c");
        assert_eq!(json["expiresAt"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_error_response_serialization() {
        let body = ErrorResponse {
            error_kind: "rate_limited".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"errorKind":"rate_limited"}"#
        );
    }
}
