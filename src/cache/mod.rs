//! Two-tier caching for catalog data.
//!
//! Each data category gets its own [`TieredCache`] so that, say, a burst of
//! search traffic cannot push the category list out of memory. All instances
//! share one durable [`PersistentStore`] and one [`Clock`].

pub mod clock;
pub mod memory;
pub mod persistent;
pub mod tiered;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{CacheConfig, CacheLimits};

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::TtlCache;
pub use persistent::{MemoryStore, PersistedRow, PersistentStore, PgStore};
pub use tiered::TieredCache;

/// Owns the named cache instances. Built once at startup and shared by
/// reference with the fetch layer and the storefront.
pub struct CacheManager {
    pub books: TieredCache,
    pub categories: TieredCache,
    pub bundles: TieredCache,
    pub search: TieredCache,
    pub normalized: TieredCache,
    network_calls: AtomicU64,
}

impl CacheManager {
    pub fn new(config: &CacheConfig, store: Arc<dyn PersistentStore>, clock: Arc<dyn Clock>) -> Self {
        let tier = |name: &'static str, limits: CacheLimits| {
            TieredCache::new(
                name,
                limits.max_items,
                limits.ttl,
                config.persistent_payload_limit,
                store.clone(),
                clock.clone(),
            )
        };

        Self {
            books: tier("books", config.books),
            categories: tier("categories", config.categories),
            bundles: tier("bundles", config.bundles),
            search: tier("search", config.search),
            normalized: tier("normalized", config.normalized),
            network_calls: AtomicU64::new(0),
        }
    }

    /// Default limits, in-process durable tier, system clock.
    pub fn in_memory() -> Self {
        Self::new(
            &CacheConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn record_network_call(&self) {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    fn tiers(&self) -> [&TieredCache; 5] {
        [
            &self.books,
            &self.categories,
            &self.bundles,
            &self.search,
            &self.normalized,
        ]
    }

    /// Empties every memory tier and removes every persisted row.
    pub async fn clear_all(&self) {
        for tier in self.tiers() {
            tier.clear();
        }
        self.books.clear_matching("").await;
        tracing::info!("all catalog caches cleared");
    }

    pub fn log_stats(&self) {
        for tier in self.tiers() {
            let counters = tier.counters();
            let hits = counters.hits.load(Ordering::Relaxed);
            let misses = counters.misses.load(Ordering::Relaxed);
            let total = hits + misses;
            if total == 0 {
                continue;
            }
            let hit_rate = (hits as f64 / total as f64) * 100.0;
            tracing::info!(
                cache = tier.name(),
                entries = tier.memory().len(),
                capacity = tier.memory().capacity(),
                hits,
                total,
                promotions = counters.promotions.load(Ordering::Relaxed),
                persist_failures = counters.persist_failures.load(Ordering::Relaxed),
                "cache stats: {hit_rate:.1}% hit rate"
            );
        }
        tracing::info!(network_calls = self.network_calls(), "total provider API calls");
    }
}

/// Stable, bounded-length cache key for a parameterised query.
pub fn query_key(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.to_lowercase().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{prefix}_{}", &digest[..32])
}
