//! Optional per-collection read cache.

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;

/// A bounded most-recently-used cache of decoded documents.
///
/// Touching an entry moves it to the back; inserting past capacity evicts
/// the least recently used entry. A capacity of zero disables the cache
/// entirely — every method becomes a no-op.
#[derive(Debug)]
pub(crate) struct ReadCache {
    inner: Option<Mutex<LruCache<String, Value>>>,
}

impl ReadCache {
    /// Creates a cache with the given capacity; 0 disables it.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns a clone of the cached document, marking it recently used.
    pub fn get(&self, id: &str) -> Option<Value> {
        let inner = self.inner.as_ref()?;
        inner.lock().get(id).cloned()
    }

    /// Caches (or refreshes) a document.
    pub fn put(&self, id: &str, doc: Value) {
        if let Some(inner) = &self.inner {
            inner.lock().put(id.to_string(), doc);
        }
    }

    /// Invalidates one entry.
    pub fn remove(&self, id: &str) {
        if let Some(inner) = &self.inner {
            inner.lock().pop(id);
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn disabled_cache_is_inert() {
        let cache = ReadCache::new(0);
        assert!(!cache.is_enabled());

        cache.put("a", json!(1));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn put_get_remove() {
        let cache = ReadCache::new(4);
        cache.put("a", json!({"x": 1}));

        assert_eq!(cache.get("a").unwrap(), json!({"x": 1}));
        cache.remove("a");
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache = ReadCache::new(2);
        cache.put("a", json!(1));
        cache.put("b", json!(2));

        // Touch "a" so "b" becomes the eviction victim.
        cache.get("a");
        cache.put("c", json!(3));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn clear_empties() {
        let cache = ReadCache::new(2);
        cache.put("a", json!(1));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
