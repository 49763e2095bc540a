//! Signed URL minting for attachment reads (spec.md §4.9). Same HMAC-SHA256
//! primitive the teacher already uses to sign outbound webhook bodies
//! (`webhooks.rs`), applied instead to short-lived read authorization.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Mints and verifies signed-URL query parameters binding a storage key to
/// an owner id and an expiry instant, so a GET succeeds only for the owner
/// encoded at mint time (spec.md §8 "signed-URL binding").
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn sign(&self, key: &str, owner_id: i64, expires_at: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(key.as_bytes());
        mac.update(b"|");
        mac.update(owner_id.to_string().as_bytes());
        mac.update(b"|");
        mac.update(expires_at.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// `base_url` is the internal path the caller will serve the bytes
    /// under, e.g. `/uploads/42/download`; the signature and expiry are
    /// appended as query parameters.
    pub fn mint(&self, base_url: &str, key: &str, owner_id: i64, ttl_secs: i64, now_unix: i64) -> String {
        let expires_at = now_unix + ttl_secs;
        let sig = self.sign(key, owner_id, expires_at);
        let sep = if base_url.contains('?') { '&' } else { '?' };
        format!("{base_url}{sep}expires={expires_at}&owner={owner_id}&sig={sig}")
    }

    /// Verifies a signature was minted by this signer for this exact
    /// `(key, owner_id, expires_at)` triple and has not expired.
    pub fn verify(&self, key: &str, owner_id: i64, expires_at: i64, sig: &str, now_unix: i64) -> bool {
        if expires_at < now_unix {
            return false;
        }
        let expected = self.sign(key, owner_id, expires_at);
        constant_time_eq(expected.as_bytes(), sig.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// An attachment URL that is an opaque storage key (not already absolute)
/// gets signed; anything starting with a scheme passes through unchanged
/// (spec.md §4.9 "absolute external URLs pass through unchanged").
pub fn sign_attachment_url(
    signer: &UrlSigner,
    url: &str,
    owner_id: i64,
    ttl_secs: i64,
    now_unix: i64,
) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    signer.mint(&format!("/uploads/{url}"), url, owner_id, ttl_secs, now_unix)
}
