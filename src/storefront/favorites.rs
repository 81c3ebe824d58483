use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// User-scoped favorite book ids.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn contains(&self, user_id: &str, book_id: &str) -> Result<bool>;
    async fn insert(&self, user_id: &str, book_id: &str) -> Result<()>;
    async fn remove(&self, user_id: &str, book_id: &str) -> Result<()>;
    /// Most recently added first.
    async fn list(&self, user_id: &str) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryFavoritesStore {
    by_user: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryFavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FavoritesStore for MemoryFavoritesStore {
    async fn contains(&self, user_id: &str, book_id: &str) -> Result<bool> {
        Ok(self
            .by_user
            .read()
            .await
            .get(user_id)
            .is_some_and(|ids| ids.iter().any(|id| id == book_id)))
    }

    async fn insert(&self, user_id: &str, book_id: &str) -> Result<()> {
        let mut by_user = self.by_user.write().await;
        let ids = by_user.entry(user_id.to_string()).or_default();
        if !ids.iter().any(|id| id == book_id) {
            ids.insert(0, book_id.to_string());
        }
        Ok(())
    }

    async fn remove(&self, user_id: &str, book_id: &str) -> Result<()> {
        if let Some(ids) = self.by_user.write().await.get_mut(user_id) {
            ids.retain(|id| id != book_id);
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .by_user
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct PgFavoritesStore {
    pool: PgPool,
}

impl PgFavoritesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dr_favorites (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, book_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create dr_favorites")?;
        Ok(())
    }
}

#[async_trait]
impl FavoritesStore for PgFavoritesStore {
    async fn contains(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM dr_favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check favorite")?;
        Ok(row.is_some())
    }

    async fn insert(&self, user_id: &str, book_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO dr_favorites (user_id, book_id) VALUES ($1, $2)
             ON CONFLICT (user_id, book_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(book_id)
        .execute(&self.pool)
        .await
        .context("Failed to add favorite")?;
        Ok(())
    }

    async fn remove(&self, user_id: &str, book_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM dr_favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove favorite")?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT book_id FROM dr_favorites WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list favorites")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("book_id").map_err(Into::into))
            .collect()
    }
}
