//! Translation Cache: `"{src}:{dst}:{sha256(normalize(text))}"` keyed,
//! TTL-bounded, evicting the oldest-by-`lastAccessed` entries on insert
//! once full.
//!
//! Shares the normalize-then-SHA-256 keying convention of
//! [`crate::partial::dedup`]; eviction order is delegated to [`lru::LruCache`]
//! since a cache hit is exactly an LRU promotion of that entry.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn key_for(source_lang: &str, target_lang: &str, text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    format!("{source_lang}:{target_lang}:{}", hex::encode(digest))
}

struct Entry {
    translated_text: String,
    expires_at: DateTime<Utc>,
}

pub struct TranslationCache {
    ttl: Duration,
    eviction_batch: usize,
    entries: Mutex<LruCache<String, Entry>>,
}

impl TranslationCache {
    pub fn new(ttl_secs: i64, max_entries: usize, eviction_batch_pct: f32) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        let eviction_batch = ((max_entries as f32 * eviction_batch_pct).ceil() as usize).max(1);
        Self { ttl: Duration::seconds(ttl_secs), eviction_batch, entries: Mutex::new(LruCache::new(capacity)) }
    }

    /// On hit, promotes the entry to most-recently-used (the cache's
    /// `lastAccessed`) and returns the cached translation; an entry past
    /// its TTL is treated as a miss and dropped.
    pub fn get(&self, source_lang: &str, target_lang: &str, text: &str) -> Option<String> {
        let key = key_for(source_lang, target_lang, text);
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => Some(entry.translated_text.clone()),
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Inserts a freshly-translated entry, evicting a small batch of the
    /// least-recently-used entries first when the cache is already at
    /// capacity (1-5% of `max_entries`, grounded in the rolling
    /// housekeeping style of [`crate::partial::dedup::DedupCache`]).
    pub fn insert(&self, source_lang: &str, target_lang: &str, text: &str, translated_text: String) {
        let key = key_for(source_lang, target_lang, text);
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= entries.cap().get() && !entries.contains(&key) {
            for _ in 0..self.eviction_batch {
                if entries.pop_lru().is_none() {
                    break;
                }
            }
        }
        entries.put(key, Entry { translated_text, expires_at: Utc::now() + self.ttl });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_after_insert() {
        let cache = TranslationCache::new(60, 100, 0.02);
        assert!(cache.get("en", "es", "hello").is_none());
        cache.insert("en", "es", "hello", "hola".into());
        assert_eq!(cache.get("en", "es", "hello").unwrap(), "hola");
    }

    #[test]
    fn distinct_language_pairs_do_not_share_a_key() {
        let cache = TranslationCache::new(60, 100, 0.02);
        cache.insert("en", "es", "hello", "hola".into());
        assert!(cache.get("en", "fr", "hello").is_none());
    }

    #[test]
    fn expired_entries_are_treated_as_a_miss() {
        let cache = TranslationCache::new(-1, 100, 0.02);
        cache.insert("en", "es", "hello", "hola".into());
        assert!(cache.get("en", "es", "hello").is_none());
    }

    #[test]
    fn eviction_keeps_size_at_or_under_the_cap() {
        let cache = TranslationCache::new(60, 10, 0.2);
        for i in 0..30 {
            cache.insert("en", "es", &format!("text {i}"), format!("texto {i}"));
        }
        assert!(cache.len() <= 10);
    }
}
