use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cache::CacheManager;
use crate::storefront::Storefront;

pub const STATS_INTERVAL: Duration = Duration::from_secs(5 * 60);
const INITIAL_DELAY: Duration = Duration::from_secs(30);

/// Pre-warm the landing page data: categories, featured books, new releases,
/// plus the first row of every category.
pub async fn warm_cache(storefront: &Storefront) {
    tracing::info!("starting catalog cache warm-up");
    storefront.prefetch_common_data().await;

    let categories = storefront.categories();
    let slugs: Vec<&str> = categories.iter().map(|c| c.slug.as_str()).collect();
    let sections = storefront.landing_sections(&slugs, 8).await;
    let warmed = sections.iter().filter(|s| s.books.is_ok()).count();

    tracing::info!(
        warmed,
        total = sections.len(),
        network_calls = storefront.caches().network_calls(),
        "catalog cache warm-up complete"
    );
}

/// Warm once after a short delay, then again every `interval`.
pub fn start_cache_refresh_task(storefront: Arc<Storefront>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(INITIAL_DELAY).await;
        warm_cache(&storefront).await;

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            warm_cache(&storefront).await;
        }
    })
}

/// Periodically log per-cache hit rates and provider call counts.
pub fn start_stats_task(caches: Arc<CacheManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            caches.log_stats();
        }
    })
}
