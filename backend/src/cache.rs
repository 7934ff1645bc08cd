//! Dual-layer cache: a fast in-process tier backed by a durable tier.
//!
//! Only successful computations are ever written. A compute closure that
//! returns `Err` leaves both tiers untouched, so a transient provider outage
//! is never remembered as an empty or broken result.

use std::{
    collections::HashMap,
    future::Future,
    num::NonZeroUsize,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend failure: {0}")]
    Backend(String),
    #[error("cache serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache io failure: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: &str, value: Value, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            value,
            expires_at: expiry_from_now(ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Ephemeral key-value tier (in-process LRU, or an external store).
#[async_trait]
pub trait FastTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Tier that survives restarts and fast-tier eviction.
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Bounded LRU fast tier with per-entry expiry.
pub struct MemoryTier {
    entries: Mutex<LruCache<String, (Value, Option<Instant>)>>,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, (Value, Option<Instant>)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FastTier for MemoryTier {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some((_, Some(deadline))) => *deadline <= Instant::now(),
            Some((_, None)) => false,
        };
        if expired {
            entries.pop(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let deadline = Instant::now().checked_add(ttl);
        self.lock().put(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock().pop(key);
        Ok(())
    }
}

/// In-process durable tier, for tests and single-node setups without a disk.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DurableTier for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.lock().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Durable tier writing one JSON document per key under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let readable: String = key
            .chars()
            .take(80)
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir
            .join(format!("{readable}-{:016x}.json", hasher.finish()))
    }
}

#[async_trait]
impl DurableTier for FileStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&content)?;
        // Hash collisions resolve to a miss.
        Ok((entry.key == key).then_some(entry))
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(entry)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Read-through / write-through cache over a fast and a durable tier.
///
/// Tier failures never fail the caller: a failed read is a miss and a failed
/// write is skipped, both logged.
#[derive(Clone)]
pub struct TieredCache {
    fast: Arc<dyn FastTier>,
    durable: Arc<dyn DurableTier>,
}

impl TieredCache {
    pub fn new(fast: Arc<dyn FastTier>, durable: Arc<dyn DurableTier>) -> Self {
        Self { fast, durable }
    }

    /// Cache with both tiers held in process memory.
    pub fn in_memory(capacity: usize) -> Self {
        Self::new(
            Arc::new(MemoryTier::new(capacity)),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Return the cached value for `key`, or run `compute` and store its
    /// result in both tiers. Errors from `compute` are returned as-is and
    /// nothing is written.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.put(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, "discarding undecodable cache entry: {}", err);
                None
            }
        }
    }

    /// Raw lookup through both tiers; promotes durable hits into the fast tier.
    pub async fn get_raw(&self, key: &str) -> Option<Value> {
        match self.fast.get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key, "fast tier hit");
                return Some(value);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(key, "fast tier read failed: {}", err),
        }

        let entry = match self.durable.get(key).await {
            Ok(Some(entry)) if !entry.is_expired() => entry,
            Ok(_) => return None,
            Err(err) => {
                tracing::warn!(key, "durable tier read failed: {}", err);
                return None;
            }
        };
        tracing::debug!(key, "durable tier hit");
        if let Err(err) = self
            .fast
            .set(key, entry.value.clone(), entry.remaining_ttl())
            .await
        {
            tracing::warn!(key, "fast tier promotion failed: {}", err);
        }
        Some(entry.value)
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, "value not cacheable: {}", err);
                return;
            }
        };
        if let Err(err) = self.fast.set(key, value.clone(), ttl).await {
            tracing::warn!(key, "fast tier write failed: {}", err);
        }
        let entry = CacheEntry::new(key, value, ttl);
        if let Err(err) = self.durable.upsert(&entry).await {
            tracing::warn!(key, "durable tier write failed: {}", err);
        }
    }

    /// Remove `key` from the fast tier first, then from the durable tier.
    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.fast.delete(key).await {
            tracing::warn!(key, "fast tier delete failed: {}", err);
        }
        if let Err(err) = self.durable.delete(key).await {
            tracing::warn!(key, "durable tier delete failed: {}", err);
        }
    }
}

/// Cache key builders. Coordinates are rounded to 5 decimals (~1 m).
pub mod keys {
    use crate::models::{ContentCategory, Coordinate, ResolutionPolicy, RouteRequest};

    fn coord(c: Coordinate) -> String {
        format!("{:.5},{:.5}", c.lat, c.lon)
    }

    pub fn normalize_text(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn route(req: &RouteRequest) -> String {
        format!(
            "route:{}:{}:{}:{}:{:.3}",
            req.strategy.as_str(),
            req.transport_mode.as_str(),
            coord(req.origin),
            coord(req.destination),
            req.max_detour_ratio
        )
    }

    pub fn geocode(name: &str) -> String {
        format!("geocode:{}", normalize_text(name))
    }

    pub fn content(query: &str, category: ContentCategory, policy: ResolutionPolicy) -> String {
        format!(
            "content:{}:{}:{}",
            category.as_str(),
            policy.as_str(),
            normalize_text(query)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FailingTier;

    #[async_trait]
    impl FastTier for FailingTier {
        async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn second_call_within_ttl_does_not_recompute() {
        let cache = TieredCache::in_memory(16);
        let calls = AtomicUsize::new(0);

        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(vec![1, 2, 3])
        };
        let first = cache.get_or_compute("k", TTL, compute).await.unwrap();
        let second = cache
            .get_or_compute("k", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(vec![9])
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_compute_is_never_stored() {
        let fast = Arc::new(MemoryTier::new(16));
        let durable = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(fast.clone(), durable.clone());

        let result: Result<u32, &str> = cache
            .get_or_compute("k", TTL, || async { Err("429 Too Many Requests") })
            .await;

        assert!(result.is_err());
        assert!(cache.get_raw("k").await.is_none());
        assert!(fast.is_empty());
        assert!(durable.is_empty());

        // the next call computes again and succeeds
        let value = cache
            .get_or_compute("k", TTL, || async { Ok::<_, &str>(7u32) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(durable.contains("k"));
    }

    #[tokio::test]
    async fn durable_hit_is_promoted_to_fast_tier() {
        let fast = Arc::new(MemoryTier::new(16));
        let durable = Arc::new(MemoryStore::new());
        durable
            .upsert(&CacheEntry::new("k", serde_json::json!("stored"), TTL))
            .await
            .unwrap();
        let cache = TieredCache::new(fast.clone(), durable);

        let value: Option<String> = cache.get("k").await;
        assert_eq!(value.as_deref(), Some("stored"));
        assert_eq!(
            fast.get("k").await.unwrap(),
            Some(serde_json::json!("stored"))
        );
    }

    #[tokio::test]
    async fn expired_durable_entry_is_a_miss() {
        let durable = Arc::new(MemoryStore::new());
        let mut entry = CacheEntry::new("k", serde_json::json!(1), TTL);
        entry.expires_at = Utc::now() - chrono::Duration::seconds(5);
        durable.upsert(&entry).await.unwrap();
        let cache = TieredCache::new(Arc::new(MemoryTier::new(4)), durable);

        assert!(cache.get_raw("k").await.is_none());
    }

    #[tokio::test]
    async fn memory_tier_expires_entries() {
        let tier = MemoryTier::new(4);
        tier.set("k", serde_json::json!(1), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(tier.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(tier.get("k").await.unwrap().is_none());
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn memory_tier_evicts_least_recently_used() {
        let tier = MemoryTier::new(2);
        tier.set("a", serde_json::json!(1), TTL).await.unwrap();
        tier.set("b", serde_json::json!(2), TTL).await.unwrap();
        tier.get("a").await.unwrap();
        tier.set("c", serde_json::json!(3), TTL).await.unwrap();

        assert!(tier.get("a").await.unwrap().is_some());
        assert!(tier.get("b").await.unwrap().is_none());
        assert!(tier.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_clears_both_tiers() {
        let fast = Arc::new(MemoryTier::new(16));
        let durable = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(fast.clone(), durable.clone());
        cache.put("k", &"v", TTL).await;

        cache.invalidate("k").await;

        assert!(fast.get("k").await.unwrap().is_none());
        assert!(!durable.contains("k"));
    }

    #[tokio::test]
    async fn failing_fast_tier_degrades_to_durable() {
        let durable = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(Arc::new(FailingTier), durable.clone());

        let value = cache
            .get_or_compute("k", TTL, || async { Ok::<_, String>(5u8) })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert!(durable.contains("k"));
        assert_eq!(cache.get::<u8>("k").await, Some(5));
    }

    #[tokio::test]
    async fn file_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let entry = CacheEntry::new("geocode:sunshine coast", serde_json::json!([1, 2]), TTL);

        store.upsert(&entry).await.unwrap();
        let loaded = store.get("geocode:sunshine coast").await.unwrap().unwrap();
        assert_eq!(loaded, entry);
        assert!(store.get("geocode:other").await.unwrap().is_none());

        store.delete("geocode:sunshine coast").await.unwrap();
        assert!(store.get("geocode:sunshine coast").await.unwrap().is_none());
        // deleting twice is fine
        store.delete("geocode:sunshine coast").await.unwrap();
    }

    #[test]
    fn keys_normalise_text_and_round_coordinates() {
        assert_eq!(keys::geocode("  Sunshine   COAST "), "geocode:sunshine coast");
        let req = crate::models::RouteRequest {
            origin: crate::models::Coordinate::new(49.282_712_3, -123.120_7),
            destination: crate::models::Coordinate::new(51.1784, -115.5708),
            strategy: crate::models::RouteStrategy::Scenic,
            max_detour_ratio: 0.3,
            transport_mode: Default::default(),
        };
        assert_eq!(
            keys::route(&req),
            "route:scenic:driving:49.28271,-123.12070:51.17840,-115.57080:0.300"
        );
    }
}
