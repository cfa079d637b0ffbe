use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Approximate bookkeeping overhead of one entry (key, map slot, timestamps).
pub const ENTRY_OVERHEAD_BYTES: usize = 200;

/// A cached translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source_text: String,
    pub translated_text: String,
    pub target_language: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        source_text: impl Into<String>,
        translated_text: impl Into<String>,
        target_language: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            target_language: target_language.into(),
            created_at,
        }
    }

    /// Compute cache key for this entry
    pub fn key(&self) -> String {
        cache_key(&self.source_text, &self.target_language)
    }

    /// An entry is expired once it is strictly older than `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }

    pub fn estimated_size(&self) -> usize {
        self.source_text.len()
            + self.translated_text.len()
            + self.target_language.len()
            + ENTRY_OVERHEAD_BYTES
    }
}

/// Lookup form of a source text: trimmed and lowercased.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Stable key for a `(text, target language)` pair.
pub fn cache_key(text: &str, target_language: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update(b"|");
    hasher.update(target_language.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_case_and_surrounding_whitespace() {
        assert_eq!(cache_key("Hello", "ja"), cache_key("  hello ", "ja"));
        assert_ne!(cache_key("Hello", "ja"), cache_key("Hello", "zh"));
        assert_ne!(cache_key("Hello", "ja"), cache_key("Hello!", "ja"));
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = cache_key("Hello", "ja");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_is_expired_boundary() {
        let now = Utc::now();
        let ttl = TimeDelta::days(30);
        let fresh = CacheEntry::new("a", "b", "ja", now - ttl);
        let stale = CacheEntry::new("a", "b", "ja", now - ttl - TimeDelta::milliseconds(1));

        assert!(!fresh.is_expired(now, ttl));
        assert!(stale.is_expired(now, ttl));
    }
}
