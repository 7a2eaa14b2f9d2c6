//! Ordered key-value store abstraction backing the snapshot store.
//!
//! Keys are byte strings compared lexicographically, so records sharing a
//! `cluster/kind/` prefix are contiguous and can be listed with one scan.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use crate::types::{MetaError, MetaResult};

/// Key type for the KV store.
pub type Key = Vec<u8>;
/// Value type for the KV store.
pub type Value = Vec<u8>;
/// A key-value pair.
pub type KvPair = (Key, Value);

/// Key-value store used for snapshot persistence.
///
/// `write_batch` must be all-or-nothing: a reader or a restarted process sees
/// either none or all of a batch's operations.
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns None if the key doesn't exist.
    fn get(&self, key: &[u8]) -> MetaResult<Option<Value>>;

    /// Put a key-value pair. Overwrites any existing value.
    fn put(&self, key: Key, value: Value) -> MetaResult<()>;

    /// Delete a key. Returns Ok(()) even if the key didn't exist.
    fn delete(&self, key: &[u8]) -> MetaResult<()>;

    /// Scan all keys with the given prefix, in sorted order.
    fn scan_prefix(&self, prefix: &[u8]) -> MetaResult<Vec<KvPair>>;

    /// Scan a range of keys [start, end), in sorted order.
    fn scan_range(&self, start: &[u8], end: &[u8]) -> MetaResult<Vec<KvPair>>;

    /// Returns true if the key exists.
    fn contains_key(&self, key: &[u8]) -> MetaResult<bool>;

    /// Atomically apply a batch of puts and deletes.
    fn write_batch(&self, ops: Vec<BatchOp>) -> MetaResult<()>;
}

/// A single operation in a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Put a key-value pair.
    Put {
        /// The key to insert or update.
        key: Key,
        /// The value to store.
        value: Value,
    },
    /// Delete a key.
    Delete {
        /// The key to delete.
        key: Key,
    },
}

pub(crate) fn lock_poisoned<E: std::fmt::Display>(e: E) -> MetaError {
    MetaError::KvError(e.to_string())
}

pub(crate) fn scan_prefix_in(map: &BTreeMap<Key, Value>, prefix: &[u8]) -> Vec<KvPair> {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn scan_range_in(map: &BTreeMap<Key, Value>, start: &[u8], end: &[u8]) -> Vec<KvPair> {
    if start >= end {
        return Vec::new();
    }
    map.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn apply_batch(map: &mut BTreeMap<Key, Value>, ops: Vec<BatchOp>) {
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

/// In-memory KV store backed by a BTreeMap. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    data: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl MemoryKvStore {
    /// Creates a new empty in-memory KV store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> MetaResult<usize> {
        Ok(self.data.read().map_err(lock_poisoned)?.len())
    }

    /// True when the store holds no keys.
    pub fn is_empty(&self) -> MetaResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> MetaResult<Option<Value>> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: Key, value: Value) -> MetaResult<()> {
        self.data.write().map_err(lock_poisoned)?.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> MetaResult<()> {
        self.data.write().map_err(lock_poisoned)?.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> MetaResult<Vec<KvPair>> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(scan_prefix_in(&data, prefix))
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> MetaResult<Vec<KvPair>> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(scan_range_in(&data, start, end))
    }

    fn contains_key(&self, key: &[u8]) -> MetaResult<bool> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(data.contains_key(key))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> MetaResult<()> {
        let mut data = self.data.write().map_err(lock_poisoned)?;
        apply_batch(&mut data, ops);
        Ok(())
    }
}
