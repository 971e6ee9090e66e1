//! Process-local TTL cache.
//!
//! Used for values that are expensive to fetch and safe to serve slightly
//! stale within a single process, such as gateway tokens and the public
//! ratings summary. Nothing here is shared across processes.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A small in-memory cache whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    /// Entries are treated as expired this long before their real expiry.
    refresh_margin: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache with the given entry lifetime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_refresh_margin(ttl, Duration::ZERO)
    }

    /// Create a cache that stops serving entries `refresh_margin` before they expire.
    #[must_use]
    pub fn with_refresh_margin(ttl: Duration, refresh_margin: Duration) -> Self {
        Self {
            ttl,
            refresh_margin,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        let usable_until = entry
            .expires_at
            .checked_sub(self.refresh_margin)
            .unwrap_or(entry.expires_at);
        (now < usable_until).then(|| entry.value.clone())
    }

    /// Insert a value using the cache's TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                Entry {
                    value,
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// Drop a single entry.
    pub fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at("k", 1, start);

        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(59)), Some(1));
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(60)), None);
    }

    #[test]
    fn test_refresh_margin() {
        let cache =
            TtlCache::with_refresh_margin(Duration::from_secs(280), Duration::from_secs(30));
        let start = Instant::now();
        cache.insert_at("token", "abc".to_string(), start);

        assert!(cache.get_at(&"token", start + Duration::from_secs(249)).is_some());
        assert!(cache.get_at(&"token", start + Duration::from_secs(250)).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));
        cache.clear();
        assert_eq!(cache.get(&2), None);
    }
}
