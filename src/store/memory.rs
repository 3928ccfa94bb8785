//! In-memory `Store` implementation.
//!
//! Backed by a single `std::sync::RwLock<HashMap<..>>`, mirroring the
//! lock usage in the teacher's `AuthState` (short critical sections,
//! no lock held across an `.await`). TTL expiry is enforced lazily on
//! read/write rather than by a background sweep, which is sufficient
//! for a process-local store and keeps the contract identical to a
//! managed store that expires items out from under readers.

use super::{Condition, Store};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

struct Entry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

pub struct MemoryStore<K, V> {
    items: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self { items: RwLock::new(HashMap::new()) }
    }
}

impl<K, V> MemoryStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry<V>) -> bool {
        match entry.expires_at {
            Some(exp) => exp > Utc::now(),
            None => true,
        }
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let items = self.items.read().unwrap();
        items.values().filter(|e| Self::is_live(e)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over a snapshot of all live values. Used by query-index
    /// style lookups built on top of the generic store.
    pub fn scan(&self) -> Vec<(K, V)> {
        let items = self.items.read().unwrap();
        items
            .iter()
            .filter(|(_, e)| Self::is_live(e))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }
}

impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn put(&self, key: K, value: V, ttl: Option<DateTime<Utc>>, condition: Option<Condition>) -> Result<(), StoreError> {
        let mut items = self.items.write().unwrap();
        let exists = items.get(&key).map(Self::is_live).unwrap_or(false);
        match condition {
            Some(Condition::NotExists) if exists => return Err(StoreError::ConditionFailed),
            Some(Condition::Exists) if !exists => return Err(StoreError::ConditionFailed),
            _ => {}
        }
        items.insert(key, Entry { value, expires_at: ttl });
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let items = self.items.read().unwrap();
        Ok(items.get(key).filter(|e| Self::is_live(e)).map(|e| e.value.clone()))
    }

    fn delete(&self, key: &K) -> Result<(), StoreError> {
        let mut items = self.items.write().unwrap();
        items.remove(key);
        Ok(())
    }
}

/// A dedicated atomic i64 counter store, one row per key, following the
/// `AtomicAdd(key, attribute, delta, condition?)` contract: the
/// decrement path conditions on `value >= |delta|` and surfaces a
/// `NegativeCount` error rather than retrying.
pub struct AtomicCounterStore<K> {
    counters: RwLock<HashMap<K, i64>>,
}

impl<K> Default for AtomicCounterStore<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self { counters: RwLock::new(HashMap::new()) }
    }
}

impl<K> AtomicCounterStore<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self, key: K, value: i64) {
        let mut counters = self.counters.write().unwrap();
        counters.entry(key).or_insert(value);
    }

    pub fn get(&self, key: &K) -> i64 {
        *self.counters.read().unwrap().get(key).unwrap_or(&0)
    }

    /// Atomically add `delta` (which may be negative) to the counter at
    /// `key`, returning the post-image value. Decrements below zero are
    /// rejected with [`StoreError::NegativeCount`] and never applied.
    pub fn atomic_add(&self, key: K, delta: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters.write().unwrap();
        let entry = counters.entry(key).or_insert(0);
        if *entry + delta < 0 {
            return Err(StoreError::NegativeCount);
        }
        *entry += delta;
        Ok(*entry)
    }

    pub fn remove(&self, key: &K) {
        self.counters.write().unwrap().remove(key);
    }
}
