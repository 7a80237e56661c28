use std::hash::Hash;
use std::sync::Arc;

use moka::sync::Cache;

/// Default capacity for resource caches (configurations, compiled schemas)
pub const DEFAULT_MAX_ENTRIES: u64 = 256;

/// In-memory cache for values that are expensive to load and read-only
/// afterwards: loaded configurations and compiled XML schemas.
///
/// It uses `moka` to handle concurrent access and "thundering herd" protection
/// (a value is only loaded once even if several runs request it simultaneously).
/// Failed loads are not cached, so the next request retries.
pub struct LoadOnceCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    cache: Cache<K, Arc<V>>,
}

impl<K, V> LoadOnceCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).build();

        Self { cache }
    }

    /// Get a value from the cache, or load it if missing.
    ///
    /// The `loader` closure only runs if the key is missing. Moka makes
    /// concurrent requests for the same key wait for the single leader.
    pub fn get_or_load<F, E>(&self, key: K, loader: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + Clone + 'static,
    {
        self.cache
            .try_get_with(key, || loader().map(Arc::new))
            .map_err(|e| (*e).clone()) // Unwrap the Arc<E> from moka
    }

    pub fn insert(&self, key: K, value: V) {
        self.cache.insert(key, Arc::new(value));
    }

    pub fn invalidate(&self, key: &K) {
        self.cache.invalidate(key);
    }

    /// Number of cached entries once pending maintenance has run
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl<K, V> Default for LoadOnceCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_loader_runs_once() {
        let cache: LoadOnceCache<String, String> = LoadOnceCache::new(10);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load("key".to_string(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("value".to_string())
                })
                .unwrap();
            assert_eq!(value.as_str(), "value");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache: LoadOnceCache<String, String> = LoadOnceCache::new(10);

        let first = cache.get_or_load("key".to_string(), || Err::<String, _>("boom".to_string()));
        assert_eq!(first.unwrap_err(), "boom");
        assert_eq!(cache.entry_count(), 0);

        let second = cache
            .get_or_load("key".to_string(), || Ok::<_, String>("ok".to_string()))
            .unwrap();
        assert_eq!(second.as_str(), "ok");
    }

    #[test]
    fn test_concurrent_loads_share_one_value() {
        use rayon::prelude::*;

        let cache: LoadOnceCache<u32, u32> = LoadOnceCache::new(10);
        let calls = AtomicUsize::new(0);

        let values: Vec<_> = (0..16)
            .into_par_iter()
            .map(|_| {
                cache
                    .get_or_load(7, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(49)
                    })
                    .unwrap()
            })
            .collect();

        assert!(values.iter().all(|v| **v == 49));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_insert_and_invalidate() {
        let cache: LoadOnceCache<&'static str, u8> = LoadOnceCache::default();
        cache.insert("a", 1);
        assert_eq!(cache.entry_count(), 1);
        let value = cache
            .get_or_load("a", || Err::<u8, _>("not loaded".to_string()))
            .unwrap();
        assert_eq!(*value, 1);

        cache.invalidate(&"a");
        assert_eq!(cache.entry_count(), 0);
    }
}
