//! SQLite-backed key-value store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{KvStore, Result, error::Context};

/// SQLite-backed persistence for bridge state.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Create a store with its own connection pool and make sure the table
    /// exists.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to connect to SQLite at {database_url}"))?;
        Self::init(&pool).await?;
        debug!(database_url, "key-value store ready");
        Ok(Self { pool })
    }

    /// Create a store using an existing pool. Call [`SqliteKvStore::init`]
    /// first if the table may be missing.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS bridge_kv (
                key        TEXT    PRIMARY KEY,
                value      BLOB    NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = sqlx::query_scalar("SELECT value FROM bridge_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO bridge_kv (key, value, updated_at) VALUES (?, ?, unixepoch())
               ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
