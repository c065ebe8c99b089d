//! Credential verification shared by user login and client authentication.
//!
//! Secrets are hashed with Argon2id into PHC strings. Verification answers only
//! yes or no; callers must not tell the requester which check failed.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, Result};

/// Hash a secret with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| OAuthError::ServerError(format!("failed to hash secret: {e}")))
}

/// Check a secret against a stored PHC hash. Malformed hashes never verify.
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Burns the same work as a real verification against an unknown principal.
///
/// Used when the username or client id does not exist so that response time
/// does not reveal whether the identifier was known.
pub fn verify_against_decoy(secret: &str, decoy_hash: &str) -> bool {
    let _ = verify_secret(secret, decoy_hash);
    false
}

/// Generate an unguessable URL-safe token with 256 bits of entropy.
pub fn generate_opaque_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest a token or code for use as a lookup key (raw values are never keys).
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
