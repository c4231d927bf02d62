use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::EntryStore;

/// SQLite-backed entry store. Each mutation runs in its own transaction.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        // Run migrations on the raw connection before wrapping in Mutex.
        Self::run_migrations(&conn)?;

        info!("SQLite entry store opened at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                author TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS processed_ids (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE
            );
            ",
        )
        .context("Failed to run entry store migrations")?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT author FROM entries ORDER BY seq ASC")
            .context("Failed to prepare entries query")?;
        let entries = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to load entries")?;
        Ok(entries)
    }

    async fn append(&self, author: &str, count: u32) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare("INSERT INTO entries (author) VALUES (?1)")?;
            for _ in 0..count {
                stmt.execute(rusqlite::params![author])
                    .context("Failed to insert entry")?;
            }
        }
        tx.commit().context("Failed to commit entries")?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM entries", [])
            .context("Failed to clear entries")?;
        Ok(())
    }

    async fn load_processed_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT message_id FROM processed_ids ORDER BY seq ASC")
            .context("Failed to prepare processed IDs query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to load processed IDs")?;
        Ok(ids)
    }

    async fn save_processed_ids(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute("DELETE FROM processed_ids", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO processed_ids (message_id) VALUES (?1)")?;
            for id in ids {
                stmt.execute(rusqlite::params![id])
                    .context("Failed to insert processed ID")?;
            }
        }
        tx.commit().context("Failed to commit processed IDs")?;
        Ok(())
    }
}
