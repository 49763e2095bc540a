//! Sliding-window rate limiting (spec.md §5, §6.3). Same in-memory
//! `Vec<Instant>`-per-key approach the teacher uses for its own limiter,
//! generalized to the handful of knobs this core actually needs: message
//! sends, room creation, and file uploads. Direct messages run through the
//! same room/message pipeline as group rooms here (see SPEC_FULL.md §11),
//! and there is no webhook ingress or client-triggered translation endpoint,
//! so those teacher-specific knobs have no counterpart and were dropped.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Instant;

/// Configurable rate limit values, read from environment variables with
/// sensible defaults.
///
/// Environment variables:
/// - `RATE_LIMIT_MESSAGES` — max messages per 10s window per caller (spec.md
///   §5: default 50)
/// - `RATE_LIMIT_ROOMS` — max room creations per hour per IP (default: 10)
/// - `RATE_LIMIT_FILES` — max file uploads per minute per IP (default: 10)
pub struct RateLimitConfig {
    pub messages_max: usize,
    pub messages_window_secs: u64,
    pub rooms_max: usize,
    pub rooms_window_secs: u64,
    pub files_max: usize,
    pub files_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_max: 50,
            messages_window_secs: 10,
            rooms_max: 10,
            rooms_window_secs: 3600,
            files_max: 10,
            files_window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("RATE_LIMIT_MESSAGES")
            && let Ok(n) = val.parse::<usize>()
        {
            config.messages_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_ROOMS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.rooms_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_FILES")
            && let Ok(n) = val.parse::<usize>()
        {
            config.files_max = n;
        }

        config
    }
}

/// Information about rate limit status for a given key.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Seconds until the oldest request in the window expires (i.e. a slot opens).
    /// 0 if there's remaining capacity.
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    limits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter { limits: Mutex::new(HashMap::new()) }
    }

    /// True if the request is allowed under `key`'s window; records it either way.
    pub fn check(&self, key: &str, max: usize, window_secs: u64) -> bool {
        self.check_with_info(key, max, window_secs).allowed
    }

    /// Check rate limit and return detailed info for response headers.
    /// `key` is typically "action:ip" or "action:user_id".
    pub fn check_with_info(&self, key: &str, max: usize, window_secs: u64) -> RateLimitInfo {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = std::time::Duration::from_secs(window_secs);

        let entries = limits.entry(key.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            let oldest = match entries.iter().min() {
                Some(t) => t,
                None => return RateLimitInfo { allowed: false, remaining: 0, limit: max, retry_after_secs: 1 },
            };
            let elapsed = now.duration_since(*oldest);
            let retry_after = if elapsed < window { (window - elapsed).as_secs() + 1 } else { 1 };

            return RateLimitInfo { allowed: false, limit: max, remaining: 0, retry_after_secs: retry_after };
        }

        entries.push(now);
        let remaining = max - entries.len();

        RateLimitInfo { allowed: true, limit: max, remaining, retry_after_secs: 0 }
    }
}
