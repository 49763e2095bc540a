//! Environment-driven tunables, read once at startup. Mirrors the teacher's
//! `RateLimitConfig::from_env()` pattern (src/rate_limit.rs) rather than
//! pulling in a config-file crate the teacher never reaches for.

use std::env;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

/// Retention, TTL worker, attachment, and translation tunables (spec.md §6.3).
pub struct AppConfig {
    pub free_retention_days: i64,
    pub premium_retention_days: Option<i64>,
    pub message_edit_window_secs: i64,
    pub expire_job_batch: i64,
    pub expire_job_interval_ms: u64,
    pub max_file_size_bytes: i64,
    pub storage_driver: String,
    pub storage_bucket: String,
    pub storage_public_base_url: Option<String>,
    pub translation_enabled: bool,
    pub translate_max_input_chars: usize,
    /// Translation calls allowed per room per 10s window (spec.md §5).
    pub rate_limit_translate: usize,
    /// Translation calls allowed per room per language per 10s window (spec.md §5).
    pub rate_limit_translate_per_lang: usize,
    pub signed_url_ttl_secs: i64,
    /// FREE plan TTL ceiling for `expireSeconds` clamp (seconds).
    pub free_plan_max_ttl_secs: i64,
    /// PREMIUM plan TTL ceiling for `expireSeconds` clamp (seconds).
    pub premium_plan_max_ttl_secs: i64,
    /// HMAC key for attachment signed URLs (spec.md §4.9).
    pub url_signing_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            free_retention_days: env_i64("FREE_RETENTION_DAYS", 30),
            premium_retention_days: env::var("PREMIUM_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok()),
            message_edit_window_secs: env_i64("MESSAGE_EDIT_WINDOW_SEC", 900),
            expire_job_batch: env_i64("EXPIRE_JOB_BATCH", 500),
            expire_job_interval_ms: env_u64("EXPIRE_JOB_INTERVAL_MS", 15_000),
            max_file_size_bytes: env_i64("MAX_FILE_SIZE_BYTES", 10 * 1024 * 1024),
            storage_driver: env::var("STORAGE_DRIVER").unwrap_or_else(|_| "local".to_string()),
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "attachments".to_string()),
            storage_public_base_url: env::var("STORAGE_PUBLIC_BASE_URL").ok(),
            translation_enabled: env_bool("TRANSLATION_ENABLED", true),
            translate_max_input_chars: env_usize("TRANSLATE_MAX_INPUT_CHARS", 4000),
            rate_limit_translate: env_usize("RATE_LIMIT_TRANSLATE", 12),
            rate_limit_translate_per_lang: env_usize("RATE_LIMIT_TRANSLATE_PER_LANG", 6),
            signed_url_ttl_secs: env_i64("SIGNED_URL_TTL_SECS", 300),
            free_plan_max_ttl_secs: env_i64("FREE_PLAN_MAX_TTL_SECS", 24 * 3600),
            premium_plan_max_ttl_secs: env_i64("PREMIUM_PLAN_MAX_TTL_SECS", 7 * 24 * 3600),
            url_signing_secret: env::var("URL_SIGNING_SECRET")
                .unwrap_or_else(|_| "dev-insecure-signing-secret".to_string()),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
