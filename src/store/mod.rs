pub mod file;
pub mod memory;
pub mod redis;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::sqlite::SqliteStore;

/// Persisted, ordered list of wheel entries plus the processed message IDs.
///
/// Every mutation is durable when the call returns. Readers never observe a
/// half-written ledger.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Current entries in gift order, empty if nothing has been stored yet
    async fn load(&self) -> Result<Vec<String>>;

    /// Append `author` `count` times after the existing entries
    async fn append(&self, author: &str, count: u32) -> Result<()>;

    /// Reset the ledger to empty
    async fn clear(&self) -> Result<()>;

    /// Processed message IDs, oldest first
    async fn load_processed_ids(&self) -> Result<Vec<String>>;

    /// Replace the persisted processed message IDs
    async fn save_processed_ids(&self, ids: &[String]) -> Result<()>;
}

/// Open the backend selected in `[storage]`
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn EntryStore>> {
    let store: Arc<dyn EntryStore> = match config {
        StorageConfig::File {
            entries_path,
            processed_path,
        } => Arc::new(FileStore::new(entries_path, processed_path)),
        StorageConfig::Redis {
            url,
            entries_key,
            processed_key,
        } => Arc::new(RedisStore::connect(url, entries_key, processed_key).await?),
        StorageConfig::Sqlite { database_path } => Arc::new(SqliteStore::open(database_path)?),
        StorageConfig::Memory => Arc::new(MemoryStore::new()),
    };

    info!("Entry store initialized: {}", config);
    Ok(store)
}
