use std::time::Duration;

use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{AsyncCommands, Client};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::EntryStore;

/// Redis-backed entry store.
///
/// Entries live in a list (`RPUSH` appends atomically, `DEL` clears).
/// Processed IDs live in a second list replaced inside `MULTI`/`EXEC`.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    entries_key: String,
    processed_key: String,
}

impl RedisStore {
    pub async fn connect(url: &str, entries_key: &str, processed_key: &str) -> Result<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(3)
            .set_connection_timeout(Duration::from_secs(5));

        let client = Client::open(url).context("Invalid Redis URL")?;
        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis, entries key: {}", entries_key);
        Ok(Self {
            conn,
            entries_key: entries_key.to_string(),
            processed_key: processed_key.to_string(),
        })
    }
}

#[async_trait]
impl EntryStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn load(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = conn
            .lrange(&self.entries_key, 0, -1)
            .await
            .context("Failed to read entries from Redis")?;
        Ok(entries)
    }

    async fn append(&self, author: &str, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let batch = vec![author; count as usize];
        let _: i64 = conn
            .rpush(&self.entries_key, batch)
            .await
            .context("Failed to append entries in Redis")?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(&self.entries_key)
            .await
            .context("Failed to clear entries in Redis")?;
        Ok(())
    }

    async fn load_processed_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .lrange(&self.processed_key, 0, -1)
            .await
            .context("Failed to read processed IDs from Redis")?;
        Ok(ids)
    }

    async fn save_processed_ids(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = ::redis::pipe();
        pipe.atomic().del(&self.processed_key).ignore();
        if !ids.is_empty() {
            pipe.rpush(&self.processed_key, ids.to_vec()).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("Failed to save processed IDs in Redis")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let err = RedisStore::connect("not-a-redis-url", "wheelEntries", "processedGiftIds")
            .await
            .err()
            .expect("connect should fail");
        assert!(err.to_string().contains("Invalid Redis URL"));
    }

    /// Needs a live server: `GIFTWHEEL_REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_lists_against_live_server() {
        let Ok(url) = std::env::var(crate::config::REDIS_URL_ENV) else {
            eprintln!("{} not set, skipping", crate::config::REDIS_URL_ENV);
            return;
        };
        let suffix = uuid::Uuid::new_v4();
        let store = RedisStore::connect(
            &url,
            &format!("giftwheel-test:entries:{suffix}"),
            &format!("giftwheel-test:processed:{suffix}"),
        )
        .await
        .unwrap();

        assert!(store.load().await.unwrap().is_empty());
        store.append("Bob", 2).await.unwrap();
        store.append("Amy", 0).await.unwrap();
        store.append("Amy", 1).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec!["Bob", "Bob", "Amy"]);

        store
            .save_processed_ids(&["m1".into(), "m2".into()])
            .await
            .unwrap();
        store
            .save_processed_ids(&["m2".into(), "m3".into()])
            .await
            .unwrap();
        assert_eq!(store.load_processed_ids().await.unwrap(), vec!["m2", "m3"]);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(store.load_processed_ids().await.unwrap(), vec!["m2", "m3"]);

        store.save_processed_ids(&[]).await.unwrap();
        assert!(store.load_processed_ids().await.unwrap().is_empty());
    }
}
