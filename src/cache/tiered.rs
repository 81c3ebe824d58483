use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::clock::{Clock, duration_ms};
use super::memory::TtlCache;
use super::persistent::{PersistedRow, PersistentStore};

/// Prefix for rows this crate owns in the durable store.
pub const PERSISTED_KEY_PREFIX: &str = "dr_api_";

#[derive(Debug, Default)]
pub struct TierCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub promotions: AtomicU64,
    pub persist_skipped: AtomicU64,
    pub persist_failures: AtomicU64,
}

impl TierCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A named memory cache optionally backed by the shared durable store.
///
/// Nothing here returns an error: a broken durable tier reads as a miss and
/// writes to it become no-ops.
pub struct TieredCache {
    memory: TtlCache<Value>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    payload_limit: usize,
    counters: TierCounters,
}

impl TieredCache {
    pub fn new(
        name: &'static str,
        capacity: usize,
        default_ttl: Duration,
        payload_limit: usize,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memory: TtlCache::new(name, capacity, clock.clone()),
            store,
            clock,
            default_ttl,
            payload_limit,
            counters: TierCounters::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.memory.name()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn counters(&self) -> &TierCounters {
        &self.counters
    }

    pub fn memory(&self) -> &TtlCache<Value> {
        &self.memory
    }

    fn persisted_key(key: &str) -> String {
        format!("{PERSISTED_KEY_PREFIX}{key}")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let hit = self.memory.get(key);
        if hit.is_some() {
            TierCounters::bump(&self.counters.hits);
        } else {
            TierCounters::bump(&self.counters.misses);
        }
        hit
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        decode(self.name(), key, value)
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.memory.set(key, value, ttl);
    }

    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl),
            Err(err) => {
                tracing::warn!(cache = self.name(), cache_key = key, error = %err, "skipping cache write: value not serializable");
            }
        }
    }

    /// Memory first, then the durable tier. A durable hit is copied back into
    /// memory for whatever TTL it has left.
    pub async fn get_persisted(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.get(key) {
            TierCounters::bump(&self.counters.hits);
            return Some(value);
        }

        let persisted_key = Self::persisted_key(key);
        let row = match self.store.load(&persisted_key).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                TierCounters::bump(&self.counters.misses);
                return None;
            }
            Err(err) => {
                TierCounters::bump(&self.counters.persist_failures);
                TierCounters::bump(&self.counters.misses);
                tracing::warn!(cache = self.name(), cache_key = key, error = %err, "persistent cache read failed");
                return None;
            }
        };

        let now = self.clock.now_ms();
        if row.expiry <= now {
            TierCounters::bump(&self.counters.misses);
            self.forget_persisted(&persisted_key).await;
            return None;
        }

        match serde_json::from_str::<Value>(&row.data) {
            Ok(value) => {
                let remaining = Duration::from_millis((row.expiry - now) as u64);
                self.memory.set(key, value.clone(), remaining);
                TierCounters::bump(&self.counters.hits);
                TierCounters::bump(&self.counters.promotions);
                tracing::debug!(cache = self.name(), cache_key = key, "promoted persisted entry to memory");
                Some(value)
            }
            Err(err) => {
                TierCounters::bump(&self.counters.persist_failures);
                TierCounters::bump(&self.counters.misses);
                tracing::warn!(cache = self.name(), cache_key = key, error = %err, "dropping corrupted persisted entry");
                self.forget_persisted(&persisted_key).await;
                None
            }
        }
    }

    pub async fn get_persisted_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_persisted(key).await?;
        decode(self.name(), key, value)
    }

    /// Writes to memory and, when the serialized payload fits under the size
    /// guard, to the durable tier.
    pub async fn set_persisted(&self, key: &str, value: Value, ttl: Duration) {
        let payload = match serde_json::to_string(&value) {
            Ok(payload) => Some(payload),
            Err(err) => {
                tracing::warn!(cache = self.name(), cache_key = key, error = %err, "failed to serialize cache payload");
                None
            }
        };

        self.memory.set(key, value, ttl);

        let Some(payload) = payload else {
            return;
        };
        if payload.len() > self.payload_limit {
            TierCounters::bump(&self.counters.persist_skipped);
            tracing::debug!(
                cache = self.name(),
                cache_key = key,
                bytes = payload.len(),
                "payload over persistent size guard; memory only"
            );
            return;
        }

        let row = PersistedRow {
            data: payload,
            expiry: self.clock.now_ms().saturating_add(duration_ms(ttl)),
        };
        if let Err(err) = self.store.store(&Self::persisted_key(key), row).await {
            TierCounters::bump(&self.counters.persist_failures);
            tracing::warn!(cache = self.name(), cache_key = key, error = %err, "persistent cache write failed");
        }
    }

    pub async fn set_persisted_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(value) => self.set_persisted(key, value, ttl).await,
            Err(err) => {
                tracing::warn!(cache = self.name(), cache_key = key, error = %err, "skipping cache write: value not serializable");
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.memory.remove(key);
    }

    pub async fn remove_persisted(&self, key: &str) {
        self.memory.remove(key);
        self.forget_persisted(&Self::persisted_key(key)).await;
    }

    pub fn clear(&self) {
        self.memory.clear();
    }

    /// Clears memory entries and durable rows whose key contains `pattern`.
    /// An empty pattern clears everything this crate persisted.
    pub async fn clear_matching(&self, pattern: &str) {
        if pattern.is_empty() {
            self.memory.clear();
        } else {
            self.memory.remove_matching(pattern);
        }
        let durable_pattern = if pattern.is_empty() {
            PERSISTED_KEY_PREFIX.to_string()
        } else {
            pattern.to_string()
        };
        if let Err(err) = self.store.delete_matching(&durable_pattern).await {
            tracing::warn!(cache = self.name(), pattern, error = %err, "failed to purge persisted entries");
        }
    }

    async fn forget_persisted(&self, persisted_key: &str) {
        if let Err(err) = self.store.delete(persisted_key).await {
            tracing::warn!(cache = self.name(), cache_key = persisted_key, error = %err, "failed to delete persisted entry");
        }
    }
}

fn decode<T: DeserializeOwned>(cache: &str, key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(cache, cache_key = key, error = %err, "cached value has unexpected shape");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::persistent::MemoryStore;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenStore;

    #[async_trait]
    impl PersistentStore for BrokenStore {
        async fn load(&self, _key: &str) -> Result<Option<PersistedRow>> {
            Err(anyhow!("quota exceeded"))
        }
        async fn store(&self, _key: &str, _row: PersistedRow) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
        async fn delete_matching(&self, _pattern: &str) -> Result<u64> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn tiered(store: Arc<dyn PersistentStore>, clock: Arc<ManualClock>, limit: usize) -> TieredCache {
        TieredCache::new("books", 10, Duration::from_secs(60), limit, store, clock)
    }

    #[tokio::test]
    async fn persisted_hit_repopulates_memory_with_remaining_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::new());
        let writer = tiered(store.clone(), clock.clone(), 1_000);
        writer
            .set_persisted("gb_book_1", json!({"title": "Arrow of God"}), Duration::from_secs(10))
            .await;

        // A fresh process: empty memory tier, same durable store.
        let reader = tiered(store.clone(), clock.clone(), 1_000);
        clock.advance(Duration::from_secs(4));
        let value = reader.get_persisted("gb_book_1").await;
        assert_eq!(value, Some(json!({"title": "Arrow of God"})));
        assert_eq!(
            reader.memory().remaining_ttl("gb_book_1"),
            Some(Duration::from_secs(6))
        );
        assert_eq!(reader.counters().promotions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn expired_persisted_row_is_a_miss_and_is_deleted() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::new());
        let cache = tiered(store.clone(), clock.clone(), 1_000);
        cache
            .set_persisted("k", json!(1), Duration::from_millis(100))
            .await;
        cache.clear();
        clock.advance(Duration::from_millis(100));

        assert!(cache.get_persisted("k").await.is_none());
        assert!(!store.contains("dr_api_k").await);
    }

    #[tokio::test]
    async fn oversized_payload_stays_in_memory_only() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::new());
        let cache = tiered(store.clone(), clock, 16);
        let big = json!({"description": "x".repeat(64)});
        cache.set_persisted("big", big.clone(), Duration::from_secs(5)).await;

        assert_eq!(cache.get("big"), Some(big));
        assert!(!store.contains("dr_api_big").await);
        assert_eq!(cache.counters().persist_skipped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn broken_store_degrades_to_memory_only() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = tiered(Arc::new(BrokenStore), clock, 1_000);

        cache.set_persisted("k", json!("v"), Duration::from_secs(5)).await;
        assert_eq!(cache.get_persisted("k").await, Some(json!("v")));

        cache.clear();
        assert!(cache.get_persisted("k").await.is_none());
        cache.remove_persisted("k").await;
        cache.clear_matching("k").await;
        assert!(cache.counters().persist_failures.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn corrupted_row_is_treated_as_miss() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::new());
        store
            .store(
                "dr_api_bad",
                PersistedRow {
                    data: "{not json".into(),
                    expiry: 10_000,
                },
            )
            .await
            .unwrap();
        let cache = tiered(store.clone(), clock, 1_000);
        assert!(cache.get_persisted("bad").await.is_none());
        assert!(!store.contains("dr_api_bad").await);
    }

    #[tokio::test]
    async fn typed_helpers_round_trip() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = tiered(Arc::new(MemoryStore::new()), clock, 1_000);
        cache.set_as("ids", &vec!["a".to_string(), "b".to_string()], Duration::from_secs(1));
        let ids: Option<Vec<String>> = cache.get_as("ids");
        assert_eq!(ids, Some(vec!["a".to_string(), "b".to_string()]));
        let wrong: Option<u32> = cache.get_as("ids");
        assert!(wrong.is_none());
    }
}
