use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::extract::DEFAULT_MAX_GIFT_COUNT;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChannelConfig {
    /// YouTube channel ID, e.g. "UCRh4qe6HGD10ZsyG56eUdHA"
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How many processed message IDs to remember for dedup
    #[serde(default = "default_processed_id_cap")]
    pub processed_id_cap: usize,
    /// How many unpersisted gift events to hold while the store is failing
    #[serde(default = "default_retry_queue_cap")]
    pub retry_queue_cap: usize,
    /// Gift counts above this are ignored as chat noise
    #[serde(default = "default_max_gift_count")]
    pub max_gift_count: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            processed_id_cap: default_processed_id_cap(),
            retry_queue_cap: default_retry_queue_cap(),
            max_gift_count: default_max_gift_count(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Poll the channel's YouTube live chat
    #[default]
    Youtube,
    /// Poll a JSON endpoint returning `[{id, author, text}]`
    Feed { url: String },
    /// Replay scripted batches from a JSON file, one batch per tick
    Mock { messages_path: PathBuf },
}

impl std::fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::Youtube => write!(f, "youtube"),
            SourceConfig::Feed { url } => write!(f, "feed ({})", url),
            SourceConfig::Mock { messages_path } => {
                write!(f, "mock ({})", messages_path.display())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    File {
        #[serde(default = "default_entries_path")]
        entries_path: PathBuf,
        #[serde(default = "default_processed_path")]
        processed_path: PathBuf,
    },
    Redis {
        #[serde(default)]
        url: String,
        #[serde(default = "default_entries_key")]
        entries_key: String,
        #[serde(default = "default_processed_key")]
        processed_key: String,
    },
    Sqlite {
        #[serde(default = "default_db_path")]
        database_path: PathBuf,
    },
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            entries_path: default_entries_path(),
            processed_path: default_processed_path(),
        }
    }
}

impl std::fmt::Display for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageConfig::File { entries_path, .. } => {
                write!(f, "file ({})", entries_path.display())
            }
            StorageConfig::Redis { entries_key, .. } => write!(f, "redis (key {})", entries_key),
            StorageConfig::Sqlite { database_path } => {
                write!(f, "sqlite ({})", database_path.display())
            }
            StorageConfig::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Secret required to clear the wheel
    #[serde(default)]
    pub clear_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,
    /// Timeout for one live-page probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// When to re-probe the live page (six-field cron, seconds first)
    #[serde(default = "default_refresh_cron")]
    pub refresh_cron: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: default_status_enabled(),
            probe_timeout_secs: default_probe_timeout_secs(),
            refresh_cron: default_refresh_cron(),
        }
    }
}

pub const CLEAR_TOKEN_ENV: &str = "GIFTWHEEL_CLEAR_TOKEN";
pub const CHANNEL_ID_ENV: &str = "GIFTWHEEL_CHANNEL_ID";
pub const REDIS_URL_ENV: &str = "GIFTWHEEL_REDIS_URL";

fn default_interval_secs() -> u64 {
    10
}

fn default_processed_id_cap() -> usize {
    500
}

fn default_retry_queue_cap() -> usize {
    1000
}

fn default_max_gift_count() -> u32 {
    DEFAULT_MAX_GIFT_COUNT
}

fn default_entries_path() -> PathBuf {
    PathBuf::from("data/entries.json")
}

fn default_processed_path() -> PathBuf {
    PathBuf::from("data/processed.json")
}

fn default_entries_key() -> String {
    "wheelEntries".to_string()
}

fn default_processed_key() -> String {
    "processedGiftIds".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("giftwheel.db")
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_status_enabled() -> bool {
    true
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_refresh_cron() -> String {
    "30 * * * * *".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        config.ensure_data_dirs()?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Secrets may come from the environment instead of the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(CLEAR_TOKEN_ENV).filter(|v| !v.is_empty()) {
            info!("Using clear token from {}", CLEAR_TOKEN_ENV);
            self.server.clear_token = token;
        }
        if let Some(id) = lookup(CHANNEL_ID_ENV).filter(|v| !v.is_empty()) {
            info!("Using channel ID from {}", CHANNEL_ID_ENV);
            self.channel.id = id;
        }
        if let StorageConfig::Redis { url, .. } = &mut self.storage {
            if let Some(env_url) = lookup(REDIS_URL_ENV).filter(|v| !v.is_empty()) {
                info!("Using Redis URL from {}", REDIS_URL_ENV);
                *url = env_url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            anyhow::bail!("[poller] interval_secs must be at least 1");
        }
        if self.poller.processed_id_cap == 0 {
            anyhow::bail!("[poller] processed_id_cap must be at least 1");
        }
        if self.poller.retry_queue_cap == 0 {
            anyhow::bail!("[poller] retry_queue_cap must be at least 1");
        }
        if self.poller.max_gift_count == 0 {
            anyhow::bail!("[poller] max_gift_count must be at least 1");
        }
        if self.server.clear_token.trim().is_empty() {
            anyhow::bail!(
                "[server] clear_token is empty; set it in the config or via {}",
                CLEAR_TOKEN_ENV
            );
        }
        if self.source == SourceConfig::Youtube && self.channel.id.trim().is_empty() {
            anyhow::bail!(
                "[channel] id is required for the youtube source (or set {})",
                CHANNEL_ID_ENV
            );
        }
        if let StorageConfig::Redis { url, .. } = &self.storage {
            if url.is_empty() {
                anyhow::bail!(
                    "[storage] url is required for the redis backend (or set {})",
                    REDIS_URL_ENV
                );
            }
        }
        Ok(())
    }

    fn ensure_data_dirs(&self) -> Result<()> {
        let paths: Vec<&Path> = match &self.storage {
            StorageConfig::File {
                entries_path,
                processed_path,
            } => vec![entries_path.as_path(), processed_path.as_path()],
            StorageConfig::Sqlite { database_path } => vec![database_path.as_path()],
            _ => Vec::new(),
        };

        for dir in paths.into_iter().filter_map(Path::parent) {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create data directory: {}", dir.display())
                })?;
            }
        }
        Ok(())
    }

    /// Whether the stream status should be probed at all
    pub fn status_probing(&self) -> bool {
        self.status.enabled && !self.channel.id.is_empty()
    }

    /// Channel page to poll for chat and live status
    pub fn live_page_url(&self) -> String {
        format!("https://www.youtube.com/channel/{}/live", self.channel.id)
    }
}
