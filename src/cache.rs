//! Bounded in-memory caches used at the ingestion edge.
//!
//! Two small primitives: a capacity+TTL cache with evict-on-read semantics
//! and a FIFO recent-set deduplicator. Both are plain service objects that
//! get injected where needed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity + TTL cache. Expired entries are dropped on access; when the
/// cache is full the oldest insertion is evicted.
pub struct TtlCache<K, V> {
    inner: Mutex<TtlCacheInner<K, V>>,
    capacity: usize,
    ttl: Duration,
}

struct TtlCacheInner<K, V> {
    map: HashMap<K, (V, Instant)>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(TtlCacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        match inner.map.get(key) {
            Some((value, inserted)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                inner.map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if !inner.map.contains_key(&key) {
            inner.order.push_back(key.clone());
        }
        inner.map.insert(key, (value, Instant::now()));

        while inner.map.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded FIFO set for "have we seen this identifier recently" checks.
pub struct RecentSet {
    inner: Mutex<RecentSetInner>,
    capacity: usize,
}

struct RecentSetInner {
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RecentSetInner {
                set: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Insert the value; returns false if it was already present.
    pub fn insert(&self, value: &str) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return true,
        };
        if inner.set.contains(value) {
            return false;
        }
        inner.set.insert(value.to_string());
        inner.order.push_back(value.to_string());
        while inner.set.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.set.remove(&oldest);
                }
                None => break,
            }
        }
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.set.contains(value))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.set.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_cache_expiry() {
        let cache: TtlCache<String, i64> = TtlCache::new(10, Duration::from_millis(20));
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_ttl_cache_capacity_eviction() {
        let cache: TtlCache<i32, i32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert!(cache.len() <= 2);
        assert_eq!(cache.get(&3), Some(3));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn test_recent_set_dedup_and_fifo_eviction() {
        let set = RecentSet::new(3);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert!(set.insert("c"));
        assert!(set.insert("d")); // evicts "a"
        assert!(!set.contains("a"));
        assert!(set.contains("d"));
        assert_eq!(set.len(), 3);
    }
}
