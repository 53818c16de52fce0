//! Byte-bounded LRU cache for compact filters.
//!
//! Entries advertise their own size through [`CacheSize`], so heterogeneous
//! values share one byte budget. Eviction happens synchronously inside `put`
//! from the least-recently-used end until the incoming entry fits.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use lode_core::Hash256;

use crate::error::CacheError;

/// A value that can account for its own size in the cache.
pub trait CacheSize {
    /// How many bytes this entry occupies.
    fn size(&self) -> u64;
}

struct Entry<V> {
    value: V,
    size: u64,
    stamp: u64,
}

struct LruInner<K, V> {
    map: HashMap<K, Entry<V>>,
    /// Access order: stamp → key. The smallest stamp is the LRU entry.
    order: BTreeMap<u64, K>,
    used: u64,
    next_stamp: u64,
}

/// A mutex-guarded cache bounded by the total byte size of its entries.
pub struct SizedLru<K, V> {
    capacity: u64,
    inner: Mutex<LruInner<K, V>>,
}

impl<K, V> SizedLru<K, V>
where
    K: Eq + Hash + Clone,
    V: CacheSize + Clone,
{
    /// Create a cache holding at most `capacity` bytes of entries.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LruInner {
                map: HashMap::new(),
                order: BTreeMap::new(),
                used: 0,
                next_stamp: 0,
            }),
        }
    }

    /// Insert `value` under `key`, replacing any existing entry and evicting
    /// least-recently-used entries until it fits. An entry larger than the
    /// whole cache is rejected without evicting anything.
    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        let size = value.size();
        if size > self.capacity {
            return Err(CacheError::TooLarge {
                size,
                capacity: self.capacity,
            });
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.remove(&key) {
            inner.order.remove(&old.stamp);
            inner.used -= old.size;
        }
        while inner.used + size > self.capacity {
            let (&stamp, _) = inner.order.iter().next().expect("used > 0 implies entries");
            let victim = inner.order.remove(&stamp).unwrap();
            let evicted = inner.map.remove(&victim).unwrap();
            inner.used -= evicted.size;
        }
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        inner.order.insert(stamp, key.clone());
        inner.used += size;
        inner.map.insert(key, Entry { value, size, stamp });
        Ok(())
    }

    /// Fetch the value for `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        let mut inner = self.inner.lock();
        let new_stamp = inner.next_stamp;
        let entry = inner.map.get_mut(key).ok_or(CacheError::NotFound)?;
        let old_stamp = entry.stamp;
        entry.stamp = new_stamp;
        let value = entry.value.clone();
        inner.next_stamp += 1;
        let key = inner.order.remove(&old_stamp).unwrap();
        inner.order.insert(new_stamp, key);
        Ok(value)
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes accounted to cached entries.
    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used
    }
}

/// Cache key for a fetched compact filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterCacheKey {
    /// Hash of the block the filter belongs to.
    pub block_hash: Hash256,
}

/// An in-memory compact filter, shared between cache hits.
#[derive(Clone, Debug)]
pub struct CachedFilter(pub Arc<Vec<u8>>);

impl CachedFilter {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }
}

impl CacheSize for CachedFilter {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }
}

/// The filter cache used by the SPV client.
pub type FilterCache = SizedLru<FilterCacheKey, CachedFilter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Sized(u64);

    impl CacheSize for Sized {
        fn size(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(100);
        cache.put(1, Sized(10)).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Sized(10));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_key_is_not_found() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(100);
        assert_eq!(cache.get(&9).unwrap_err(), CacheError::NotFound);
    }

    #[test]
    fn oversized_entry_rejected_without_evicting() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(100);
        cache.put(1, Sized(60)).unwrap();
        assert_eq!(
            cache.put(2, Sized(101)).unwrap_err(),
            CacheError::TooLarge {
                size: 101,
                capacity: 100
            }
        );
        // The resident entry survived the rejected insert.
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&1).is_ok());
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(100);
        cache.put(1, Sized(40)).unwrap();
        cache.put(2, Sized(40)).unwrap();
        // Touch 1 so 2 becomes the LRU entry.
        cache.get(&1).unwrap();
        cache.put(3, Sized(40)).unwrap();

        assert_eq!(cache.get(&2).unwrap_err(), CacheError::NotFound);
        assert!(cache.get(&1).is_ok());
        assert!(cache.get(&3).is_ok());
    }

    #[test]
    fn evicts_multiple_until_fit() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(100);
        cache.put(1, Sized(30)).unwrap();
        cache.put(2, Sized(30)).unwrap();
        cache.put(3, Sized(30)).unwrap();
        cache.put(4, Sized(90)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&4).is_ok());
        assert_eq!(cache.used_bytes(), 90);
    }

    #[test]
    fn replacing_a_key_reaccounts_size() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(100);
        cache.put(1, Sized(80)).unwrap();
        cache.put(1, Sized(20)).unwrap();
        assert_eq!(cache.used_bytes(), 20);
        assert_eq!(cache.len(), 1);
        // Room for more now.
        cache.put(2, Sized(70)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn size_sum_never_exceeds_capacity() {
        let cache: SizedLru<u32, Sized> = SizedLru::new(50);
        for i in 0..20 {
            cache.put(i, Sized(7)).unwrap();
            assert!(cache.used_bytes() <= 50);
        }
    }

    #[test]
    fn filter_cache_accounts_filter_bytes() {
        let cache = FilterCache::new(1_000);
        let key = FilterCacheKey {
            block_hash: Hash256([1; 32]),
        };
        cache.put(key, CachedFilter::new(vec![0u8; 600])).unwrap();
        assert_eq!(cache.used_bytes(), 600);
        assert_eq!(cache.get(&key).unwrap().0.len(), 600);
    }
}
