//! Credential hashing and random identifiers
//!
//! Secrets are hashed with Argon2id and stored as PHC strings. Verification
//! delegates to argon2, which compares digests in constant time.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use thiserror::Error;

/// Length of a token identifier in random bytes
pub const TOKEN_ID_BYTES: usize = 16;

/// Generate a unique token identifier
///
/// 16 bytes from the OS RNG, URL-safe Base64 without padding (22 characters).
///
/// # Example
///
/// ```
/// use auth_service::auth::password::generate_token_id;
///
/// let id = generate_token_id();
/// assert_eq!(id.len(), 22);
/// ```
pub fn generate_token_id() -> String {
    let mut id_bytes = [0u8; TOKEN_ID_BYTES];
    getrandom(&mut id_bytes);
    URL_SAFE_NO_PAD.encode(id_bytes)
}

/// Fill a byte slice with random bytes using OsRng
fn getrandom(dest: &mut [u8]) {
    use rand::RngCore;
    OsRng.fill_bytes(dest);
}

/// Hash a secret using Argon2id
///
/// The hash includes a random salt, so hashing the same secret twice yields
/// different strings.
///
/// # Errors
///
/// Returns an error if hashing fails (should not happen in normal operation)
///
/// # Example
///
/// ```
/// use auth_service::auth::password::hash_secret;
///
/// let hash = hash_secret("s3cret").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_secret(secret: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::HashFailed(e.to_string()))
}

/// Verify a secret against a stored hash
///
/// Returns `false` for a malformed hash rather than an error, so a corrupt
/// record is indistinguishable from a wrong secret to the caller.
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Argon2id hash that no presented secret is expected to match
///
/// Verifying against it costs the same as verifying a stored credential, so
/// a lookup miss can be made to take as long as a wrong secret. Computed on
/// first use with the same parameters as [`hash_secret`].
pub fn dummy_credential_hash() -> &'static str {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    DUMMY_HASH.get_or_init(|| {
        let mut material = [0u8; 32];
        getrandom(&mut material);
        hash_secret(&URL_SAFE_NO_PAD.encode(material)).unwrap_or_default()
    })
}

/// Error type for secret hashing operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// Hashing failed
    #[error("Hash failed: {0}")]
    HashFailed(String),
}
