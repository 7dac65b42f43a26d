use crate::routing::key::RoutingKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded map from routing key to value with a time-to-live.
///
/// Expired entries are dropped lazily on lookup. Inserting a new key into a
/// full cache first evicts the entry with the oldest insertion time.
pub struct SelectorCache<V> {
    entries: Mutex<HashMap<RoutingKey, Entry<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<V: Clone> SelectorCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &RoutingKey) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &RoutingKey, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.inserted_at) > self.ttl,
        };

        if expired {
            entries.remove(key);
            tracing::debug!(key = %key, "Selector cache entry expired");
            return None;
        }

        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn has(&self, key: &RoutingKey) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&self, key: RoutingKey, value: V) {
        self.set_at(key, value, Instant::now());
    }

    pub(crate) fn set_at(&self, key: RoutingKey, value: V, now: Instant) {
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                tracing::debug!(key = %oldest, "Evicted oldest selector cache entry");
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn remove(&self, key: &RoutingKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> RoutingKey {
        RoutingKey::new(name, false)
    }

    #[test]
    fn test_set_get_remove() {
        let cache = SelectorCache::new(Duration::from_secs(60), 4);
        cache.set(key("a"), 1);
        assert_eq!(cache.get(&key("a")), Some(1));
        assert!(cache.has(&key("a")));
        assert!(!cache.has(&RoutingKey::new("a", true)));

        assert!(cache.remove(&key("a")));
        assert_eq!(cache.get(&key("a")), None);
        assert!(!cache.remove(&key("a")));
    }

    #[test]
    fn test_expired_entries_are_absent_and_removed() {
        let cache = SelectorCache::new(Duration::from_secs(10), 4);
        let start = Instant::now();
        cache.set_at(key("a"), 1, start);

        assert_eq!(cache.get_at(&key("a"), start + Duration::from_secs(10)), Some(1));
        assert_eq!(cache.get_at(&key("a"), start + Duration::from_secs(11)), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_full_cache_evicts_oldest_insertion() {
        let cache = SelectorCache::new(Duration::from_secs(3600), 3);
        let start = Instant::now();
        cache.set_at(key("b"), 2, start + Duration::from_secs(2));
        cache.set_at(key("a"), 1, start + Duration::from_secs(1));
        cache.set_at(key("c"), 3, start + Duration::from_secs(3));

        cache.set_at(key("d"), 4, start + Duration::from_secs(4));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_at(&key("a"), start), None);
        assert_eq!(cache.get_at(&key("b"), start), Some(2));
        assert_eq!(cache.get_at(&key("d"), start), Some(4));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = SelectorCache::new(Duration::from_secs(3600), 5);
        for i in 0..50 {
            cache.set(key(&format!("model-{}", i)), i);
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_overwriting_existing_key_does_not_evict() {
        let cache = SelectorCache::new(Duration::from_secs(3600), 2);
        cache.set(key("a"), 1);
        cache.set(key("b"), 2);
        cache.set(key("a"), 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a")), Some(10));
        assert_eq!(cache.get(&key("b")), Some(2));
    }

    #[test]
    fn test_clear() {
        let cache = SelectorCache::new(Duration::from_secs(60), 4);
        cache.set(key("a"), 1);
        cache.set(RoutingKey::new("a", true), 2);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
