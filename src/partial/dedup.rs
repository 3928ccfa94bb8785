//! Normalized-text deduplication cache: suppresses forwarding a
//! partial or final whose normalized text was already forwarded.
//!
//! Lowercase, strip punctuation, collapse whitespace, then SHA-256 the
//! result for the cache key. TTL-based with opportunistic cleanup on
//! insert, plus an emergency purge of the oldest half when the cache
//! grows past its configured maximum.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.chars().filter(|c| !".,!?;:'\"".contains(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn key_for(text: &str) -> String {
    let normalized = normalize(text);
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

struct Inner {
    entries: HashMap<String, DateTime<Utc>>,
}

pub struct DedupCache {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl DedupCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries, inner: Mutex::new(Inner { entries: HashMap::new() }) }
    }

    pub fn contains(&self, text: &str) -> bool {
        let key = key_for(text);
        let mut inner = self.inner.lock().unwrap();
        self.cleanup(&mut inner);
        inner.entries.get(&key).map(|expires| *expires > Utc::now()).unwrap_or(false)
    }

    pub fn insert(&self, text: &str) {
        let key = key_for(text);
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(key, Utc::now() + self.ttl);
        self.cleanup(&mut inner);
        self.emergency_purge(&mut inner);
    }

    fn cleanup(&self, inner: &mut Inner) {
        let now = Utc::now();
        inner.entries.retain(|_, expires| *expires > now);
    }

    fn emergency_purge(&self, inner: &mut Inner) {
        if inner.entries.len() <= self.max_entries {
            return;
        }
        let mut by_expiry: Vec<(String, DateTime<Utc>)> =
            inner.entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
        by_expiry.sort_by_key(|(_, expires)| *expires);
        let drop_count = inner.entries.len() - self.max_entries;
        for (key, _) in by_expiry.into_iter().take(drop_count) {
            inner.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_punctuation_and_whitespace() {
        let cache = DedupCache::new(Duration::seconds(10), 100);
        cache.insert("Hello, World!");
        assert!(cache.contains("hello   world"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = DedupCache::new(Duration::milliseconds(-1), 100);
        cache.insert("already expired");
        assert!(!cache.contains("already expired"));
    }

    #[test]
    fn emergency_purge_evicts_down_to_max_entries() {
        let cache = DedupCache::new(Duration::seconds(60), 3);
        for i in 0..10 {
            cache.insert(&format!("text {i}"));
        }
        assert!(cache.len() <= 3);
    }
}
