//! SQLite connection pool and schema.

use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use sampler_core::StoreError;

/// Open a pool for `database_url` (e.g. `sqlite://sampler.db` or
/// `sqlite::memory:`) and create the schema.
///
/// An in-memory database lives only as long as its single connection, so
/// the pool is pinned to one connection that never expires.
pub async fn open_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url:?}"))?
        .create_if_missing(true);

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open SQLite database at {database_url:?}"))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they do not exist yet.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create kv table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_submissions (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            record          TEXT    NOT NULL,
            next_attempt_at INTEGER NOT NULL,
            attempts        INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create pending_submissions table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS pending_submissions_next_attempt_at
            ON pending_submissions (next_attempt_at, id)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create pending_submissions index")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quarantined_submissions (
            id              INTEGER PRIMARY KEY,
            record          TEXT,
            next_attempt_at INTEGER,
            attempts        INTEGER,
            reason          TEXT    NOT NULL,
            quarantined_at  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create quarantined_submissions table")?;

    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::corrupt(format!("{operation}: {err}"))
        }
        other => StoreError::unavailable(format!("{operation}: {other}")),
    }
}
