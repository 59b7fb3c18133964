use std::sync::Arc;

use {
    teamsync_config::StorageConfig,
    teamsync_store::{KvStore, MemoryKvStore, SqliteKvStore},
    tracing::{info, warn},
};

/// Open the configured key-value store. Without a database URL everything
/// lives in memory.
pub async fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = SqliteKvStore::new(url).await?;
            info!(database_url = url, "using SQLite store");
            Ok(Arc::new(store))
        },
        None => {
            warn!("no database configured, bridge state will not survive a restart");
            Ok(Arc::new(MemoryKvStore::new()))
        },
    }
}
