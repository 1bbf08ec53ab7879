//! SQLite-backed key/value store.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use sampler_core::{KvStore, StoreError};

use crate::db::map_sqlx_error;

/// [`KvStore`] on the `kv` table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("kv_get", e))?;

        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| map_sqlx_error("kv_get", e))
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO kv (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(*key)
            .bind(value.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("kv_set", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("kv_remove", e))?;
        Ok(())
    }
}
