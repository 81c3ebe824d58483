use std::env;
use std::time::Duration;

pub const GOOGLE_BOOKS_API_BASE: &str = "https://www.googleapis.com/books/v1";
pub const OPEN_LIBRARY_API_BASE: &str = "https://openlibrary.org";

/// Serialized payloads above this many bytes stay out of the persistent tier.
pub const PERSISTENT_PAYLOAD_LIMIT: usize = 500_000;

/// TTL and capacity for one named cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub ttl: Duration,
    pub max_items: usize,
}

impl CacheLimits {
    pub const fn new(ttl_secs: u64, max_items: usize) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            max_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub books: CacheLimits,
    pub categories: CacheLimits,
    pub bundles: CacheLimits,
    pub search: CacheLimits,
    /// Normalized books kept so synthesized fields stay stable between views.
    pub normalized: CacheLimits,
    pub persistent_payload_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            books: CacheLimits::new(30 * 60, 200),
            categories: CacheLimits::new(60 * 60, 20),
            bundles: CacheLimits::new(15 * 60, 10),
            search: CacheLimits::new(5 * 60, 50),
            normalized: CacheLimits::new(30 * 60, 1000),
            persistent_payload_limit: PERSISTENT_PAYLOAD_LIMIT,
        }
    }
}

/// Request timeouts per endpoint, by how much the UI depends on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub search: Duration,
    pub details: Duration,
    pub open_library: Duration,
    pub author: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(10),
            details: Duration::from_secs(8),
            open_library: Duration::from_secs(15),
            author: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub google_api_key: Option<String>,
    pub database_url: Option<String>,
    pub google_books_base_url: String,
    pub open_library_base_url: String,
    pub preload_batch: usize,
    pub prefetch_interval: Duration,
    pub cache: CacheConfig,
    pub timeouts: Timeouts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            google_api_key: None,
            database_url: None,
            google_books_base_url: GOOGLE_BOOKS_API_BASE.to_string(),
            open_library_base_url: OPEN_LIBRARY_API_BASE.to_string(),
            preload_batch: 5,
            prefetch_interval: Duration::from_secs(60 * 60),
            cache: CacheConfig::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()`
    /// first if a `.env` file should be honoured.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let preload_batch = non_empty("DIGIREADS_PRELOAD_BATCH")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n.clamp(5, 8))
            .unwrap_or(defaults.preload_batch);

        let prefetch_interval = non_empty("DIGIREADS_PREFETCH_INTERVAL_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.prefetch_interval);

        Self {
            google_api_key: non_empty("GOOGLE_BOOKS_API_KEY"),
            database_url: non_empty("DATABASE_URL"),
            google_books_base_url: non_empty("GOOGLE_BOOKS_BASE_URL")
                .unwrap_or(defaults.google_books_base_url),
            open_library_base_url: non_empty("OPEN_LIBRARY_BASE_URL")
                .unwrap_or(defaults.open_library_base_url),
            preload_batch,
            prefetch_interval,
            cache: defaults.cache,
            timeouts: defaults.timeouts,
        }
    }
}
