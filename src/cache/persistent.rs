use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A row in the durable tier: serialized JSON plus its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRow {
    pub data: String,
    pub expiry: i64,
}

/// Durable key/value rows backing the memory tier.
///
/// Implementations report failures; the tiered cache is what turns them into
/// misses.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<PersistedRow>>;
    async fn store(&self, key: &str, row: PersistedRow) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Deletes rows whose key contains `pattern`.
    async fn delete_matching(&self, pattern: &str) -> Result<u64>;
}

/// Process-local stand-in used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, PersistedRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.rows.read().await.contains_key(key)
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<PersistedRow>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn store(&self, key: &str, row: PersistedRow) -> Result<()> {
        self.rows.write().await.insert(key.to_string(), row);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.rows.write().await.remove(key);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|key, _| !key.contains(pattern));
        Ok((before - rows.len()) as u64)
    }
}

/// Postgres-backed tier: one row per cache key in `dr_cache_entries`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dr_cache_entries (
                cache_key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                expiry BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create dr_cache_entries")?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for PgStore {
    async fn load(&self, key: &str) -> Result<Option<PersistedRow>> {
        let row = sqlx::query("SELECT data, expiry FROM dr_cache_entries WHERE cache_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read cache row {key}"))?;

        row.map(|row| -> Result<PersistedRow> {
            Ok(PersistedRow {
                data: row.try_get("data")?,
                expiry: row.try_get("expiry")?,
            })
        })
        .transpose()
    }

    async fn store(&self, key: &str, row: PersistedRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO dr_cache_entries (cache_key, data, expiry)
             VALUES ($1, $2, $3)
             ON CONFLICT (cache_key)
             DO UPDATE SET data = $2, expiry = $3, updated_at = NOW()",
        )
        .bind(key)
        .bind(&row.data)
        .bind(row.expiry)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write cache row {key}"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM dr_cache_entries WHERE cache_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete cache row {key}"))?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dr_cache_entries WHERE strpos(cache_key, $1) > 0")
            .bind(pattern)
            .execute(&self.pool)
            .await
            .context("Failed to purge cache rows")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_rows() -> Result<()> {
        let store = MemoryStore::new();
        let row = PersistedRow {
            data: "{\"a\":1}".to_string(),
            expiry: 42,
        };
        store.store("dr_api_x", row.clone()).await?;
        assert_eq!(store.load("dr_api_x").await?, Some(row));
        store.delete("dr_api_x").await?;
        assert_eq!(store.load("dr_api_x").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_deletes_by_pattern() -> Result<()> {
        let store = MemoryStore::new();
        for key in ["dr_api_gb_1", "dr_api_gb_2", "dr_api_ol_1"] {
            store
                .store(
                    key,
                    PersistedRow {
                        data: "null".into(),
                        expiry: 0,
                    },
                )
                .await?;
        }
        assert_eq!(store.delete_matching("gb_").await?, 2);
        assert_eq!(store.len().await, 1);
        assert!(store.contains("dr_api_ol_1").await);
        Ok(())
    }
}
