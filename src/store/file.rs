use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::EntryStore;

/// On-disk shape of the entries file
#[derive(Debug, Default, Serialize, Deserialize)]
struct EntriesDocument {
    #[serde(default)]
    entries: Vec<String>,
}

/// Older wheel files were a bare JSON array
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntries {
    Document(EntriesDocument),
    Bare(Vec<String>),
}

/// JSON-file backed entry store.
///
/// Writes go to a sibling `.tmp` file which is synced and renamed over the
/// target, so a crash never leaves a truncated document behind.
pub struct FileStore {
    entries_path: PathBuf,
    processed_path: PathBuf,
    // Serialises read-modify-write cycles between the poller and HTTP clears
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(entries_path: &Path, processed_path: &Path) -> Self {
        Self {
            entries_path: entries_path.to_path_buf(),
            processed_path: processed_path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn read_entries(&self) -> Result<Vec<String>> {
        let Some(bytes) = read_if_exists(&self.entries_path).await? else {
            return Ok(Vec::new());
        };
        let stored: StoredEntries = serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "Failed to parse entries file: {}",
                self.entries_path.display()
            )
        })?;
        Ok(match stored {
            StoredEntries::Document(doc) => doc.entries,
            StoredEntries::Bare(entries) => entries,
        })
    }

    async fn write_entries(&self, entries: Vec<String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&EntriesDocument { entries })?;
        write_atomic(&self.entries_path, &bytes).await
    }
}

#[async_trait]
impl EntryStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        self.read_entries().await
    }

    async fn append(&self, author: &str, count: u32) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.extend(std::iter::repeat(author.to_string()).take(count as usize));
        let total = entries.len();
        self.write_entries(entries).await?;
        debug!("Appended {} entries for {} (total {})", count, author, total);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_entries(Vec::new()).await
    }

    async fn load_processed_ids(&self) -> Result<Vec<String>> {
        let Some(bytes) = read_if_exists(&self.processed_path).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "Failed to parse processed IDs file: {}",
                self.processed_path.display()
            )
        })
    }

    async fn save_processed_ids(&self, ids: &[String]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(ids)?;
        write_atomic(&self.processed_path, &bytes).await
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("Failed to sync {}", tmp.display()))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
