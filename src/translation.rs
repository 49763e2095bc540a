//! Translation fan-out (spec.md §4.1 step 6, §5). The provider itself is an
//! external collaborator out of scope for this core (spec.md §1); what
//! belongs here is the cache tiering and the trait boundary a real provider
//! plugs into.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait TranslationProvider: Send + Sync {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String, String>;
}

/// Stands in for the real provider binding. Every call fails, which drives
/// the "omit that language on failure" path (spec.md §4.1 step 6) — the
/// same behavior a provider outage would produce.
pub struct NoopTranslationProvider;

impl TranslationProvider for NoopTranslationProvider {
    fn translate(&self, _text: &str, _target_lang: &str) -> Result<String, String> {
        Err("no translation provider configured".to_string())
    }
}

fn cache_key(text: &str, target_lang: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(target_lang.as_bytes());
    hex::encode(hasher.finalize())
}

struct Entry {
    value: String,
    expires_at: Instant,
    last_used: Instant,
}

/// Two read-through tiers sharing the same key space: a small in-memory
/// LRU-lite bound to `HOT_CAPACITY` entries, and an unbounded TTL-backed
/// tier modeling the external cache (spec.md §5). Both are best-effort.
///
/// Also owns the translation rate limiter (spec.md §5: "Translation per room
/// is limited to 12 per 10s and 6 per 10s per language") — co-located here
/// rather than threaded through every route as a separate managed state,
/// since every caller of `translate_for_targets` already holds a
/// `TranslationCache` reference.
pub struct TranslationCache {
    hot: Mutex<HashMap<String, Entry>>,
    cold: Mutex<HashMap<String, Entry>>,
    limits: Mutex<HashMap<String, Vec<Instant>>>,
    room_max: usize,
    lang_max: usize,
}

const HOT_CAPACITY: usize = 500;
const ENTRY_TTL: Duration = Duration::from_secs(24 * 3600);
/// Defaults matching spec.md §5; overridable via `RATE_LIMIT_TRANSLATE` /
/// `RATE_LIMIT_TRANSLATE_PER_LANG` (see `TranslationCache::with_limits`).
const ROOM_TRANSLATE_MAX: usize = 12;
const LANG_TRANSLATE_MAX: usize = 6;
const TRANSLATE_WINDOW: Duration = Duration::from_secs(10);

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::with_limits(ROOM_TRANSLATE_MAX, LANG_TRANSLATE_MAX)
    }

    /// Same as `new`, but with the room-wide and per-language translate
    /// rate limits taken from config (spec.md §5, SPEC_FULL.md §10.2)
    /// instead of the built-in defaults.
    pub fn with_limits(room_max: usize, lang_max: usize) -> Self {
        Self {
            hot: Mutex::new(HashMap::new()),
            cold: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
            room_max,
            lang_max,
        }
    }

    /// Sliding-window check shared by the room-wide and per-language
    /// translate limits; records the attempt regardless of outcome.
    fn check_rate(&self, key: &str, max: usize) -> bool {
        let mut limits = self.limits.lock().unwrap();
        let now = Instant::now();
        let entries = limits.entry(key.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < TRANSLATE_WINDOW);
        if entries.len() >= max {
            return false;
        }
        entries.push(now);
        true
    }

    /// True if this room may still issue a translation call this window
    /// (spec.md §5: 12 per 10s per room).
    pub fn allow_room(&self, chat_room_id: i64) -> bool {
        self.check_rate(&format!("room:{chat_room_id}"), self.room_max)
    }

    /// True if this room+language may still issue a translation call this
    /// window (spec.md §5: 6 per 10s per language).
    pub fn allow_lang(&self, chat_room_id: i64, lang: &str) -> bool {
        self.check_rate(&format!("room:{chat_room_id}|lang:{lang}"), self.lang_max)
    }

    pub fn get(&self, text: &str, target_lang: &str) -> Option<String> {
        let key = cache_key(text, target_lang);
        let now = Instant::now();

        {
            let mut hot = self.hot.lock().unwrap();
            if let Some(entry) = hot.get_mut(&key) {
                if entry.expires_at > now {
                    entry.last_used = now;
                    return Some(entry.value.clone());
                }
                hot.remove(&key);
            }
        }

        let mut cold = self.cold.lock().unwrap();
        if let Some(entry) = cold.get(&key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
            cold.remove(&key);
        }
        None
    }

    pub fn put(&self, text: &str, target_lang: &str, value: String) {
        let key = cache_key(text, target_lang);
        let now = Instant::now();
        let entry = Entry { value: value.clone(), expires_at: now + ENTRY_TTL, last_used: now };

        let mut hot = self.hot.lock().unwrap();
        if hot.len() >= HOT_CAPACITY && !hot.contains_key(&key) {
            if let Some(evict_key) = hot.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone()) {
                hot.remove(&evict_key);
            }
        }
        hot.insert(key.clone(), entry);
        drop(hot);

        self.cold.lock().unwrap().insert(
            key,
            Entry { value, expires_at: now + ENTRY_TTL, last_used: now },
        );
    }
}

/// Runs step 6 of the create pipeline for one message: fan out to every
/// target language not already covered by the sender's language, reading
/// through the cache first and writing back on a provider hit. A cache hit
/// never touches the rate limiter; only calls that would reach the external
/// provider are counted against it (spec.md §5). Failures — provider error
/// or rate limit — are silently omitted from the result map.
pub fn translate_for_targets(
    cache: &TranslationCache,
    provider: &dyn TranslationProvider,
    text: &str,
    sender_lang: &str,
    target_langs: &[String],
    chat_room_id: i64,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for lang in target_langs {
        if lang == sender_lang {
            continue;
        }
        if let Some(cached) = cache.get(text, lang) {
            out.insert(lang.clone(), cached);
            continue;
        }
        if !cache.allow_room(chat_room_id) || !cache.allow_lang(chat_room_id, lang) {
            continue;
        }
        match provider.translate(text, lang) {
            Ok(translated) => {
                cache.put(text, lang, translated.clone());
                out.insert(lang.clone(), translated);
            }
            Err(_) => continue,
        }
    }
    out
}
