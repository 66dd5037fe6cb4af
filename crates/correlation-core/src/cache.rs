//! Bounded concurrent key/value caches used for correlation
//!
//! All three correlation caches (address/port, SSRC, NG cookie) share the same
//! contract: byte-string keys and values, `set`/`get` only, a fixed byte
//! budget and an eviction policy the correlators never rely on.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::debug;

use crate::config::CorrelatorConfig;

/// Cache engine contract
///
/// Implementations are internally synchronized; the correlators never lock
/// around them. `get` returning `Some` with an empty value is a hit.
pub trait CorrelationCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &[u8], value: &[u8]);

    /// Look up `key`
    fn get(&self, key: &[u8]) -> Option<Bytes>;
}

/// Shared handle to a cache
pub type CacheHandle = Arc<dyn CorrelationCache>;

/// Cache bounded by the total size of its keys and values
#[derive(Clone)]
pub struct ByteBudgetCache {
    name: &'static str,
    budget: u64,
    inner: Cache<Bytes, Bytes>,
}

impl ByteBudgetCache {
    /// Create a cache holding at most `budget` bytes of keys plus values
    ///
    /// Every write is admitted; the least recently used entries make room.
    pub fn new(name: &'static str, budget: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(budget)
            .eviction_policy(EvictionPolicy::lru())
            .weigher(|key: &Bytes, value: &Bytes| -> u32 {
                u32::try_from(key.len() + value.len()).unwrap_or(u32::MAX)
            })
            .build();

        Self { name, budget, inner }
    }

    /// Name used in log output
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Configured byte budget
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Approximate number of entries; eviction bookkeeping is deferred
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl CorrelationCache for ByteBudgetCache {
    fn set(&self, key: &[u8], value: &[u8]) {
        if key.is_empty() {
            debug!(target: "cache", "{}: refusing empty key", self.name);
            return;
        }
        self.inner
            .insert(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
    }

    fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.inner.get(key)
    }
}

impl fmt::Debug for ByteBudgetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBudgetCache")
            .field("name", &self.name)
            .field("budget", &self.budget)
            .finish()
    }
}

/// The caches shared by one correlation engine
#[derive(Clone)]
pub struct CacheSet {
    /// SDP announced address+port to CallID; short lived
    pub address_port: CacheHandle,
    /// RTCP SSRC to CallID; long lived, filled by promotion
    pub ssrc: CacheHandle,
    /// NG cookie to CallID
    pub cookie: CacheHandle,
}

impl CacheSet {
    /// Create three byte-budget caches sized from `config`
    pub fn from_config(config: &CorrelatorConfig) -> Self {
        Self {
            address_port: Arc::new(ByteBudgetCache::new("address_port", config.address_port_cache_bytes)),
            ssrc: Arc::new(ByteBudgetCache::new("ssrc", config.ssrc_cache_bytes)),
            cookie: Arc::new(ByteBudgetCache::new("cookie", config.cookie_cache_bytes)),
        }
    }
}

impl Default for CacheSet {
    fn default() -> Self {
        Self::from_config(&CorrelatorConfig::default())
    }
}

impl fmt::Debug for CacheSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_get() {
        let cache = ByteBudgetCache::new("test", 1024);
        assert!(cache.get(b"10.0.0.18001").is_none());

        cache.set(b"10.0.0.18001", b"call-1@host");
        assert_eq!(cache.get(b"10.0.0.18001").unwrap(), Bytes::from_static(b"call-1@host"));

        cache.set(b"10.0.0.18001", b"call-2@host");
        assert_eq!(cache.get(b"10.0.0.18001").unwrap(), Bytes::from_static(b"call-2@host"));
    }

    #[test]
    fn test_empty_value_is_a_hit() {
        let cache = ByteBudgetCache::new("test", 1024);
        cache.set(b"key", b"");
        assert_eq!(cache.get(b"key"), Some(Bytes::new()));
    }

    #[test]
    fn test_empty_key_ignored() {
        let cache = ByteBudgetCache::new("test", 1024);
        cache.set(b"", b"value");
        assert!(cache.get(b"").is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_budget_bounds_entries() {
        let cache = ByteBudgetCache::new("test", 256);
        for i in 0..1000u32 {
            cache.set(format!("key-{}", i).as_bytes(), b"0123456789abcdef");
        }
        assert!(cache.entry_count() < 100);
        assert_eq!(cache.budget(), 256);
    }

    #[test]
    fn test_new_writes_admitted_when_full() {
        let cache = ByteBudgetCache::new("test", 4096);
        for i in 0..2000u32 {
            let key = format!("10.0.0.{}:{}", i % 250, 10000 + i);
            cache.set(key.as_bytes(), b"old-call@host");
            for _ in 0..3 {
                let _ = cache.get(key.as_bytes());
            }
        }
        cache.entry_count();

        for i in 0..100u32 {
            let key = format!("192.0.2.{}:{}", i % 250, 20000 + i);
            cache.set(key.as_bytes(), b"new-call@host");
            assert_eq!(cache.get(key.as_bytes()), Some(Bytes::from_static(b"new-call@host")), "{}", key);
        }

        // still there once pending evictions are applied
        cache.entry_count();
        assert!(cache.get(b"192.0.2.99:20099").is_some());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ByteBudgetCache::new("test", 1024 * 1024));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("{}-{}", worker, i);
                        cache.set(key.as_bytes(), key.as_bytes());
                        assert_eq!(cache.get(key.as_bytes()).unwrap(), Bytes::from(key));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for worker in 0..8 {
            assert!(cache.get(format!("{}-199", worker).as_bytes()).is_some());
        }
    }
}
