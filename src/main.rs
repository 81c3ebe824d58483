use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use digireads_catalog::cache::{MemoryStore, PersistentStore, PgStore};
use digireads_catalog::cache_warmer::{self, STATS_INTERVAL};
use digireads_catalog::storefront::{FavoritesStore, MemoryFavoritesStore, PgFavoritesStore};
use digireads_catalog::{Settings, Storefront};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,digireads_catalog=info")),
        )
        .init();

    let settings = Settings::from_env();

    let (store, favorites): (Arc<dyn PersistentStore>, Arc<dyn FavoritesStore>) =
        match &settings.database_url {
            Some(database_url) => {
                let database = PgPoolOptions::new()
                    .max_connections(10)
                    .min_connections(2)
                    .acquire_timeout(Duration::from_secs(3))
                    .idle_timeout(Duration::from_secs(600))
                    .max_lifetime(Duration::from_secs(1800))
                    .connect(database_url)
                    .await
                    .context("Failed to connect to DATABASE_URL")?;

                let store = PgStore::new(database.clone());
                store.ensure_schema().await?;
                let favorites = PgFavoritesStore::new(database);
                favorites.ensure_schema().await?;
                tracing::info!("using Postgres for the persistent cache tier and favorites");

                let store: Arc<dyn PersistentStore> = Arc::new(store);
                let favorites: Arc<dyn FavoritesStore> = Arc::new(favorites);
                (store, favorites)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; persistent tier and favorites are in-process only");
                let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
                let favorites: Arc<dyn FavoritesStore> = Arc::new(MemoryFavoritesStore::new());
                (store, favorites)
            }
        };

    let storefront = Arc::new(Storefront::from_settings(&settings, store, favorites)?);

    let stats = cache_warmer::start_stats_task(storefront.caches().clone(), STATS_INTERVAL);
    let warmer = cache_warmer::start_cache_refresh_task(storefront.clone(), settings.prefetch_interval);

    storefront.prefetch_common_data().await;
    tracing::info!("catalog ready; press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    warmer.abort();
    stats.abort();
    storefront.caches().log_stats();
    Ok(())
}
