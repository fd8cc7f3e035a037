use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::pagination::DEFAULT_PAGE_SIZE;

static DATA_DIR_NAME: &str = "blogroll";
static DB_NAME: &str = "blogroll.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";

// For now this directory structure should be like
// data_dir_path
// |- blogroll
//    |- blogroll.sqlite
//    |- config.json

const DEFAULT_FEED_CACHE_TTL_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data directory available on this platform")]
    NoDataDir,
    #[error("failed to read or write config")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Malformed(#[from] serde_json::Error),
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_feed_cache_ttl_secs() -> u64 {
    DEFAULT_FEED_CACHE_TTL_SECS
}

fn default_log_filter() -> String {
    "info".to_owned()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlogrollConfig {
    pub database_path: PathBuf,

    /// Posts per feed page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// How long a composed global feed is reused.
    #[serde(default = "default_feed_cache_ttl_secs")]
    pub feed_cache_ttl_secs: u64,

    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl BlogrollConfig {
    /// Creates a config with default settings and the database under `data_dir`
    pub fn new(data_dir: PathBuf) -> Self {
        BlogrollConfig {
            database_path: data_dir.join(DB_NAME),
            page_size: default_page_size(),
            feed_cache_ttl_secs: default_feed_cache_ttl_secs(),
            log_filter: default_log_filter(),
        }
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            page_size: self.page_size,
            global_ttl: Duration::from_secs(self.feed_cache_ttl_secs),
        }
    }
}

/// The part of the configuration the feed composer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub page_size: u64,
    pub global_ttl: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            global_ttl: Duration::from_secs(DEFAULT_FEED_CACHE_TTL_SECS),
        }
    }
}

/// Gets the existing config or initializes a new one if it doesn't exist
pub async fn get_or_init() -> Result<BlogrollConfig, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    load_or_create(data_dir.join(DATA_DIR_NAME)).await
}

/// Same as [`get_or_init`], rooted at an explicit directory.
pub async fn load_or_create(dir: PathBuf) -> Result<BlogrollConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    // Create the directory if it doesn't exist
    fs::create_dir_all(&dir).await?;

    if fs::try_exists(&config_path).await? {
        // Read and deserialize existing config
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: BlogrollConfig = serde_json::from_str(&contents)?;
        Ok(config)
    } else {
        let config = BlogrollConfig::new(dir);

        // Serialize and write to file
        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        tracing::info!(path = %config_path.display(), "wrote default config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("blogroll-config-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn creates_default_config_then_reads_it_back() {
        let dir = scratch_dir("roundtrip");
        let _ = fs::remove_dir_all(&dir).await;

        let created = load_or_create(dir.clone()).await.unwrap();
        assert_eq!(created.page_size, 10);
        assert_eq!(created.feed_cache_ttl_secs, 20);
        assert_eq!(created.database_path, dir.join(DB_NAME));

        let loaded = load_or_create(dir.clone()).await.unwrap();
        assert_eq!(loaded, created);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: BlogrollConfig =
            serde_json::from_str(r#"{ "database_path": "/tmp/blog.sqlite" }"#).unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.log_filter, "info");
        assert_eq!(
            config.feed_settings(),
            FeedSettings {
                page_size: 10,
                global_ttl: Duration::from_secs(20),
            }
        );
    }

    #[test]
    fn rejects_malformed_config() {
        let result = serde_json::from_str::<BlogrollConfig>("{ not json");
        assert!(matches!(ConfigError::from(result.unwrap_err()), ConfigError::Malformed(_)));
    }
}
