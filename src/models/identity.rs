//! Identity domain model
//!
//! An identity is a registered principal that can authenticate. The
//! credential hash travels with it but is never printed.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    /// May authenticate
    #[default]
    Active,
    /// Temporarily barred, e.g. by an operator
    Locked,
    /// Permanently barred
    Disabled,
}

impl IdentityStatus {
    /// Whether an identity with this status may authenticate
    pub fn can_authenticate(&self) -> bool {
        matches!(self, IdentityStatus::Active)
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityStatus::Active => write!(f, "active"),
            IdentityStatus::Locked => write!(f, "locked"),
            IdentityStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for IdentityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(IdentityStatus::Active),
            "locked" => Ok(IdentityStatus::Locked),
            "disabled" => Ok(IdentityStatus::Disabled),
            _ => Err(format!("Invalid identity status: {}", s)),
        }
    }
}

/// A registered principal with its hashed credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique identifier (login name)
    pub identifier: String,

    /// Argon2id PHC hash of the secret
    #[serde(skip_serializing)]
    pub credential_hash: String,

    /// Current status
    pub status: IdentityStatus,

    /// Free-form attributes
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// When the identity was registered
    pub created_at: DateTime<Utc>,

    /// When the identity was last modified
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new active identity
    pub fn new(identifier: impl Into<String>, credential_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.into(),
            credential_hash: credential_hash.into(),
            status: IdentityStatus::Active,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set status
    pub fn with_status(mut self, status: IdentityStatus) -> Self {
        self.status = status;
        self
    }

    /// Add a metadata attribute
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this identity may authenticate
    pub fn is_active(&self) -> bool {
        self.status.can_authenticate()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("identifier", &self.identifier)
            .field("credential_hash", &"<redacted>")
            .field("status", &self.status)
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Identity as asserted by an external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Provider name
    pub provider: String,

    /// Subject identifier issued by the provider
    pub subject: String,

    /// Human-readable username, if the provider returned one
    pub username: Option<String>,
}
