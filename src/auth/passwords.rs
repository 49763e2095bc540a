//! Password hashing and one-shot token hashing.
//!
//! `argon2` is the only crate in the pack's "security" manifests that covers
//! this (see DESIGN.md); everything else here is plain `sha2`, already a
//! dependency for webhook signing.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub fn hash_password(plain: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| e.to_string())
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else { return false };
    Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok()
}

/// Reset tokens and session tokens are random and shown to the caller once;
/// only their digest is stored, so a leaked database row can't be replayed.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
