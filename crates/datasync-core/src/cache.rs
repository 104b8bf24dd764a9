//! Object cache
//!
//! A per-handle, cost-bounded LRU map from [`ObjectKey`] to the deserialized
//! document. The cost of an entry is the byte size of its blob; when the sum
//! of all costs would exceed the capacity, least recently used entries are
//! evicted first.
//!
//! The cache never touches the backing store. A miss simply means the caller
//! has to go back to the persistence engine.

use lru::LruCache;
use tracing::debug;

use crate::key::{Document, ObjectKey};

#[derive(Debug)]
struct CacheEntry {
    doc: Document,
    cost: u64,
}

/// Cost-weighted LRU cache of documents
#[derive(Debug)]
pub struct ObjectCache {
    entries: LruCache<ObjectKey, CacheEntry>,
    total_cost: u64,
    capacity: u64,
    default_capacity: u64,
}

impl ObjectCache {
    /// Create a cache with the given default capacity (in bytes)
    pub fn new(default_capacity: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_cost: 0,
            capacity: default_capacity,
            default_capacity,
        }
    }

    /// Maximum total cost
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Change the maximum total cost, evicting entries if needed
    pub fn set_capacity(&mut self, capacity: u64) {
        self.capacity = capacity;
        self.trim_to(capacity);
    }

    /// Restore the configured default capacity
    pub fn reset_capacity(&mut self) {
        self.set_capacity(self.default_capacity);
    }

    /// Sum of all entry costs
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a document, marking it most recently used
    pub fn get(&mut self, key: &ObjectKey) -> Option<&Document> {
        self.entries.get(key).map(|entry| &entry.doc)
    }

    /// Check for an entry without touching its recency
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert or replace an entry
    ///
    /// An entry that alone exceeds the capacity is not cached, and any older
    /// entry for the same key is dropped.
    pub fn insert(&mut self, key: ObjectKey, doc: Document, cost: u64) {
        self.remove(&key);
        if cost > self.capacity {
            debug!(key = %key, cost, capacity = self.capacity, "Document too large to cache");
            return;
        }

        self.trim_to(self.capacity - cost);
        self.total_cost += cost;
        self.entries.put(key, CacheEntry { doc, cost });
    }

    /// Drop one entry, returning whether it was cached
    pub fn remove(&mut self, key: &ObjectKey) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_cost -= entry.cost;
                true
            }
            None => false,
        }
    }

    /// Drop every entry of one type
    pub fn remove_type(&mut self, type_name: &[u8]) {
        let keys: Vec<ObjectKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.type_name == type_name)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            self.remove(&key);
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_cost = 0;
    }

    /// Evict least recently used entries until the total cost fits `budget`
    fn trim_to(&mut self, budget: u64) {
        while self.total_cost > budget {
            match self.entries.pop_lru() {
                Some((key, entry)) => {
                    debug!(key = %key, cost = entry.cost, "Evicted cache entry");
                    self.total_cost -= entry.cost;
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(n: i64) -> Document {
        json!({ "n": n }).as_object().cloned().unwrap()
    }

    fn key(id: &str) -> ObjectKey {
        ObjectKey::new("User", id)
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = ObjectCache::new(100);
        cache.insert(key("a"), doc(1), 10);

        assert_eq!(cache.get(&key("a")), Some(&doc(1)));
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.total_cost(), 10);
    }

    #[test]
    fn test_replace_updates_cost() {
        let mut cache = ObjectCache::new(100);
        cache.insert(key("a"), doc(1), 10);
        cache.insert(key("a"), doc(2), 25);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 25);
        assert_eq!(cache.get(&key("a")), Some(&doc(2)));
    }

    #[test]
    fn test_evicts_least_recently_used_by_cost() {
        let mut cache = ObjectCache::new(30);
        cache.insert(key("a"), doc(1), 10);
        cache.insert(key("b"), doc(2), 10);
        cache.insert(key("c"), doc(3), 10);

        // Touch "a" so "b" becomes the oldest
        cache.get(&key("a"));
        cache.insert(key("d"), doc(4), 15);

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(!cache.contains(&key("c")));
        assert!(cache.contains(&key("d")));
        assert_eq!(cache.total_cost(), 25);
    }

    #[test]
    fn test_oversized_entry_is_not_cached() {
        let mut cache = ObjectCache::new(10);
        cache.insert(key("a"), doc(1), 5);
        cache.insert(key("a"), doc(2), 11);

        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_set_capacity_evicts_immediately() {
        let mut cache = ObjectCache::new(100);
        cache.insert(key("a"), doc(1), 40);
        cache.insert(key("b"), doc(2), 40);

        cache.set_capacity(50);
        assert_eq!(cache.capacity(), 50);
        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&key("b")));

        cache.reset_capacity();
        assert_eq!(cache.capacity(), 100);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_type() {
        let mut cache = ObjectCache::new(100);
        cache.insert(key("a"), doc(1), 10);
        cache.insert(ObjectKey::new("Group", "a"), doc(2), 10);

        cache.remove_type(b"User");
        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&ObjectKey::new("Group", "a")));
        assert_eq!(cache.total_cost(), 10);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = ObjectCache::new(100);
        cache.insert(key("a"), doc(1), 10);
        cache.insert(key("b"), doc(2), 10);

        assert!(cache.remove(&key("a")));
        assert!(!cache.remove(&key("a")));
        assert_eq!(cache.total_cost(), 10);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }
}
