use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::EntryStore;

#[derive(Default)]
struct Ledger {
    entries: Vec<String>,
    processed_ids: Vec<String>,
}

/// In-process store for tests and throwaway demo runs. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().await.entries.clone())
    }

    async fn append(&self, author: &str, count: u32) -> Result<()> {
        let mut ledger = self.inner.lock().await;
        ledger
            .entries
            .extend(std::iter::repeat(author.to_string()).take(count as usize));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.lock().await.entries.clear();
        Ok(())
    }

    async fn load_processed_ids(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().await.processed_ids.clone())
    }

    async fn save_processed_ids(&self, ids: &[String]) -> Result<()> {
        self.inner.lock().await.processed_ids = ids.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_clear() {
        let store = MemoryStore::new();
        store.append("Bob", 2).await.unwrap();
        store.append("Amy", 1).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec!["Bob", "Bob", "Amy"]);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_processed_ids() {
        let store = MemoryStore::new();
        store.save_processed_ids(&["m1".to_string()]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load_processed_ids().await.unwrap(), vec!["m1"]);
    }
}
