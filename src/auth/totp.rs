//! RFC 6238 TOTP on top of the project's existing `hmac` dependency, plus
//! `sha1` (the hash RFC 4226/6238 specify for HOTP/TOTP — authenticator apps
//! interoperate only with SHA-1 here, a weaker primitive than the rest of
//! this codebase uses is simply what the standard requires).

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const STEP_SECS: u64 = 30;
const DIGITS: u32 = 6;

/// Generate 160 bits of secret, the size RFC 4226 recommends for HMAC-SHA1.
pub fn generate_secret() -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Base32 (RFC 4648, no padding) — the encoding authenticator apps expect
/// when a secret is shown to a user as a QR code or manual-entry string.
pub fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut out = String::new();
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1F;
            out.push(ALPHABET[index as usize] as char);
        }
    }
    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1F;
        out.push(ALPHABET[index as usize] as char);
    }
    out
}

pub fn base32_decode(s: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut out = Vec::new();
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0;
    for c in s.to_ascii_uppercase().bytes() {
        if c == b'=' {
            continue;
        }
        let value = ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | value;
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            out.push((buffer >> bits_in_buffer) as u8);
        }
    }
    Some(out)
}

fn hotp(secret: &[u8], counter: u64) -> u32 {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let truncated = ((digest[offset] & 0x7f) as u32) << 24
        | (digest[offset + 1] as u32) << 16
        | (digest[offset + 2] as u32) << 8
        | (digest[offset + 3] as u32);
    truncated % 10u32.pow(DIGITS)
}

pub fn totp_code(secret: &[u8], unix_time_secs: u64) -> String {
    let counter = unix_time_secs / STEP_SECS;
    format!("{:0width$}", hotp(secret, counter), width = DIGITS as usize)
}

/// Accepts the code for the current step or one step on either side, to
/// tolerate clock drift between the server and the authenticator app.
pub fn verify(secret: &[u8], code: &str, unix_time_secs: u64) -> bool {
    let counter = unix_time_secs / STEP_SECS;
    for drift in [0i64, -1, 1] {
        let c = (counter as i64 + drift).max(0) as u64;
        let expected = format!("{:0width$}", hotp(secret, c), width = DIGITS as usize);
        if expected == code {
            return true;
        }
    }
    false
}
