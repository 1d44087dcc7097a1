//! Signing keyring
//!
//! The keyring is built once at startup from configuration and never mutated.
//! Rotation is modelled as an ordered set: the first key signs new tokens and
//! every key that has not reached its `retire_at` instant still verifies.

use chrono::{DateTime, Utc};
use ring::hmac;
use thiserror::Error;

/// Minimum secret length in bytes for HS256
pub const MIN_SECRET_BYTES: usize = 32;

/// Errors raised while building a keyring
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyringError {
    /// No keys were supplied
    #[error("keyring must contain at least one key")]
    Empty,

    /// A secret is too short
    #[error("key '{0}' must be at least {MIN_SECRET_BYTES} bytes")]
    SecretTooShort(String),

    /// Two keys share an identifier
    #[error("duplicate key id '{0}'")]
    DuplicateKid(String),

    /// A key identifier is empty
    #[error("key id must not be empty")]
    EmptyKid,

    /// The signing key is already retired, so its tokens would never verify
    #[error("signing key '{0}' is already retired")]
    SigningKeyRetired(String),
}

/// A single HMAC signing key
pub struct SigningKey {
    kid: String,
    key: hmac::Key,
    retire_at: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// Create a key from raw secret bytes
    pub fn new(
        kid: impl Into<String>,
        secret: &[u8],
        retire_at: Option<DateTime<Utc>>,
    ) -> Result<Self, KeyringError> {
        let kid = kid.into();
        if kid.is_empty() {
            return Err(KeyringError::EmptyKid);
        }
        if secret.len() < MIN_SECRET_BYTES {
            return Err(KeyringError::SecretTooShort(kid));
        }

        Ok(Self {
            kid,
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            retire_at,
        })
    }

    /// Key identifier carried in the token header
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// When this key stops verifying, if ever
    pub fn retire_at(&self) -> Option<DateTime<Utc>> {
        self.retire_at
    }

    /// Whether the key still verifies at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.retire_at.map_or(true, |retire_at| now < retire_at)
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        hmac::sign(&self.key, message).as_ref().to_vec()
    }

    /// Verify a signature in constant time
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        hmac::verify(&self.key, message, signature).is_ok()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("retire_at", &self.retire_at)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable set of signing keys
#[derive(Debug)]
pub struct Keyring {
    keys: Vec<SigningKey>,
}

impl Keyring {
    /// Build a keyring; the first key is the active signing key
    pub fn new(keys: Vec<SigningKey>) -> Result<Self, KeyringError> {
        if keys.is_empty() {
            return Err(KeyringError::Empty);
        }

        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|other| other.kid == key.kid) {
                return Err(KeyringError::DuplicateKid(key.kid.clone()));
            }
        }

        Ok(Self { keys })
    }

    /// The key used to sign new tokens
    pub fn signing_key(&self) -> &SigningKey {
        // Non-empty by construction
        &self.keys[0]
    }

    /// Fail if the signing key no longer verifies at `now`
    pub fn ensure_signing_key_active(&self, now: DateTime<Utc>) -> Result<(), KeyringError> {
        let key = self.signing_key();
        if key.is_active_at(now) {
            Ok(())
        } else {
            Err(KeyringError::SigningKeyRetired(key.kid.clone()))
        }
    }

    /// Find a key that may verify a token at `now`
    pub fn verification_key(&self, kid: &str, now: DateTime<Utc>) -> Option<&SigningKey> {
        self.keys
            .iter()
            .find(|key| key.kid == kid)
            .filter(|key| key.is_active_at(now))
    }

    /// Identifiers of all configured keys, signing key first
    pub fn kids(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.kid.as_str()).collect()
    }

    /// Number of configured keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; a keyring cannot be built empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
