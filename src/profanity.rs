//! Plaintext content policy (spec.md §4.1 step 5). Deliberately simple: a
//! fixed word list and a masking pass, in the same spirit as the teacher's
//! other pure-function helpers (`rate_limit`'s sliding window, `retention`'s
//! batch chunking) — no external moderation service, since that provider is
//! out of scope (spec.md §1).

const BLOCKED_WORDS: &[&str] = &[
    "damn", "hell", "shit", "fuck", "bitch", "asshole", "bastard", "crap",
];

/// True if `content` contains any blocked token, matched case-insensitively
/// on word boundaries (ASCII alphanumeric runs).
pub fn is_explicit(content: &str) -> bool {
    tokenize(content).iter().any(|tok| is_blocked(tok))
}

/// Replace each blocked token with asterisks of the same length, leaving
/// everything else — including surrounding punctuation — untouched.
pub fn censor(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut current = String::new();

    let flush = |current: &mut String, out: &mut String| {
        if current.is_empty() {
            return;
        }
        if is_blocked(current) {
            out.push_str(&"*".repeat(current.chars().count()));
        } else {
            out.push_str(current);
        }
        current.clear();
    };

    for ch in content.chars() {
        if ch.is_alphanumeric() {
            current.push(ch);
        } else {
            flush(&mut current, &mut out);
            out.push(ch);
        }
    }
    flush(&mut current, &mut out);
    out
}

fn tokenize(content: &str) -> Vec<String> {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn is_blocked(token: &str) -> bool {
    let lower = token.to_lowercase();
    BLOCKED_WORDS.contains(&lower.as_str())
}
