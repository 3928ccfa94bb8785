//! Key-value store abstraction.
//!
//! The core depends on this trait, never on a concrete database. A
//! production deployment would back it with DynamoDB-or-similar; here
//! we ship [`memory::MemoryStore`], an in-process implementation with
//! the same atomicity and TTL guarantees the trait promises, so the
//! rest of the system can be exercised without an external collaborator.

pub mod memory;

use crate::error::StoreError;
use chrono::{DateTime, Utc};

/// Condition attached to a conditional write.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Succeed only if no item currently exists at the key.
    NotExists,
    /// Succeed only if an item currently exists at the key.
    Exists,
}

/// A typed item with an optional expiry, the unit the store moves.
#[derive(Debug, Clone)]
pub struct StoredItem<T> {
    pub value: T,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Minimal KV contract every component in this crate is written
/// against. All operations must be atomic against concurrent callers.
pub trait Store<K, V>: Send + Sync
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn put(&self, key: K, value: V, ttl: Option<DateTime<Utc>>, condition: Option<Condition>) -> Result<(), StoreError>;
    fn get(&self, key: &K) -> Result<Option<V>, StoreError>;
    fn delete(&self, key: &K) -> Result<(), StoreError>;
}

/// Result of an `atomic_add`: the post-image numeric value.
pub type AtomicAddResult = Result<i64, StoreError>;
