//! Two-level content cache.
//! L1: in-memory LRU with TTL, keyed by the blake3 digest of the cache key.
//! L2: SQLite store, accessed through a retry wrapper that backs off on
//! transient storage errors with jittered exponential delays.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use super::normalize::CacheKey;
use super::sqlite_cache::{CacheError, SqliteStore};
use crate::config::CacheConfig;

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

/// In-memory L1 cache.
pub struct TranslationCache {
    inner: Mutex<LruCache<[u8; 32], CacheEntry>>,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Look up a cached value. Returns None if absent or expired.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let digest = key.digest();
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(&digest) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            cache.pop(&digest);
        }
        None
    }

    pub fn insert(&self, key: &CacheKey, value: String) {
        self.inner.lock().put(
            key.digest(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) {
        self.inner.lock().pop(&key.digest());
    }
}

/// Backoff schedule for transient storage errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_percent: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_percent: config.jitter_percent,
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay with up to `jitter_percent` of random extra wait added.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        let max_jitter = base.as_millis() as u64 * u64::from(self.jitter_percent) / 100;
        if max_jitter == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        base + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retry budget runs out.
pub async fn retry_transient<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, CacheError>
where
    F: FnMut() -> Result<T, CacheError>,
{
    let mut retry = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(op = what, retry = retry + 1, delay_ms = delay.as_millis() as u64, error = %e, "transient cache error, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) if e.is_transient() => {
                let CacheError::Storage(source) = e else {
                    return Err(e);
                };
                return Err(CacheError::RetriesExhausted {
                    attempts: retry + 1,
                    source,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// L1 in front of L2, with every L2 call under the retry wrapper.
pub struct ContentCache {
    l1: TranslationCache,
    l2: SqliteStore,
    retry: RetryPolicy,
}

impl ContentCache {
    pub fn new(l2: SqliteStore, config: &CacheConfig) -> Self {
        Self {
            l1: TranslationCache::new(config.l1_capacity, Duration::from_secs(config.l1_ttl_secs)),
            l2,
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let store = SqliteStore::open(&config.path, Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self::new(store, config))
    }

    pub fn in_memory(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self::new(SqliteStore::open_in_memory()?, config))
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        if let Some(value) = self.l1.get(key) {
            debug!(key = %key, "L1 cache hit");
            return Ok(Some(value));
        }
        let value = retry_transient(&self.retry, "get", || self.l2.get(key.as_str())).await?;
        if let Some(v) = &value {
            self.l1.insert(key, v.clone());
        }
        Ok(value)
    }

    pub async fn set(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        retry_transient(&self.retry, "set", || self.l2.set(key.as_str(), value)).await?;
        self.l1.insert(key, value.to_string());
        Ok(())
    }

    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.l1.remove(key);
        retry_transient(&self.retry, "remove", || self.l2.remove(key.as_str())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameDomain;
    use crate::translate::TranslationMode;
    use rusqlite::ffi;

    fn key(text: &str) -> CacheKey {
        CacheKey::new(GameDomain::Stellaris, TranslationMode::Standard, text)
    }

    fn busy() -> CacheError {
        CacheError::Storage(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[test]
    fn test_l1_ttl_expiry() {
        let cache = TranslationCache::new(4, Duration::ZERO);
        cache.insert(&key("Hello"), "안녕".into());
        assert_eq!(cache.get(&key("Hello")), None);
    }

    #[test]
    fn test_l1_capacity_eviction() {
        let cache = TranslationCache::new(1, Duration::from_secs(60));
        cache.insert(&key("a"), "1".into());
        cache.insert(&key("b"), "2".into());
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("b")).as_deref(), Some("2"));
    }

    #[test]
    fn test_backoff_is_capped_and_jitter_bounded() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(5000),
            jitter_percent: 25,
        };
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay_for(40), Duration::from_millis(5000));
        for _ in 0..50 {
            let d = policy.delay_for(2);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_busy() {
        let mut calls = 0;
        let result = retry_transient(&RetryPolicy::default(), "get", || {
            calls += 1;
            if calls < 3 {
                Err(busy())
            } else {
                Ok(calls)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_budget() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let mut calls = 0;
        let result: Result<(), _> = retry_transient(&policy, "set", || {
            calls += 1;
            Err(busy())
        })
        .await;
        assert_eq!(calls, 3);
        assert!(matches!(result, Err(CacheError::RetriesExhausted { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_transient(&RetryPolicy::default(), "get", || {
            calls += 1;
            Err(CacheError::Storage(rusqlite::Error::InvalidQuery))
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(CacheError::Storage(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_after_busy_keeps_its_label() {
        let mut calls = 0;
        let result: Result<(), _> = retry_transient(&RetryPolicy::default(), "set", || {
            calls += 1;
            if calls == 1 {
                Err(busy())
            } else {
                Err(CacheError::Storage(rusqlite::Error::InvalidQuery))
            }
        })
        .await;
        assert_eq!(calls, 2);
        assert!(matches!(result, Err(CacheError::Storage(rusqlite::Error::InvalidQuery))));
    }

    #[tokio::test]
    async fn test_content_cache_levels() {
        let cache = ContentCache::in_memory(&CacheConfig::default()).unwrap();
        let k = key("Energy Credits");
        assert_eq!(cache.get(&k).await.unwrap(), None);
        cache.set(&k, "에너지 크레딧").await.unwrap();
        assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("에너지 크레딧"));
        cache.remove(&k).await.unwrap();
        assert_eq!(cache.get(&k).await.unwrap(), None);
    }
}
