//! Configuration types for media-dl

use crate::error::{Error, Result};
use crate::types::MediaKind;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::Path, path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, retries)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Save directory for finished files (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory holding in-progress files, one subdirectory per chat (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum simultaneously active transfers (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Re-submissions allowed per item after a failed verification (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_download_retries: u32,

    /// Size of one remote chunk in bytes; resume offsets are multiples of this (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Media kinds that are downloaded; everything else is skipped (default: all)
    #[serde(default = "default_download_types")]
    pub download_types: BTreeSet<MediaKind>,

    /// Upper bound on how long shutdown waits for active transfers (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Minimum time between two edits of an item's status message (default: 2 seconds)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    pub progress_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            max_download_retries: default_max_retries(),
            chunk_size: default_chunk_size(),
            download_types: default_download_types(),
            shutdown_timeout: default_shutdown_timeout(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// Backoff applied between re-submissions of a failed item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first re-submission (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between re-submissions (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Durable state locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// File recording every target that ever fully completed (default: "download_history.json")
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
        }
    }
}

/// Polling behavior for the external conversion service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Interval between history polls (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Give up after this long without a media reply (default: 180 seconds)
    #[serde(default = "default_converter_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Messages fetched per poll (default: 10)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            timeout: default_converter_timeout(),
            history_limit: default_history_limit(),
        }
    }
}

/// Main configuration for [`MediaDownloader`](crate::MediaDownloader)
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) - directories, concurrency, retries, enabled kinds
/// - [`retry`](RetryConfig) - backoff between re-submissions
/// - [`persistence`](PersistenceConfig) - completion history file
/// - [`converter`](ConverterConfig) - conversion service polling
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry backoff
    #[serde(default)]
    pub retry: RetryConfig,

    /// Durable state
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Conversion service polling
    #[serde(default)]
    pub converter: ConverterConfig,
}

impl Config {
    /// Parse a configuration document; missing fields take their defaults
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration document from disk
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.download.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk_size must be greater than zero".to_string(),
                key: Some("chunk_size".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be at least 1.0".to_string(),
                key: Some("backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }

    /// Save directory for finished files
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Directory for in-progress files
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_chunk_size() -> u64 {
    1024 * 1024
}

fn default_download_types() -> BTreeSet<MediaKind> {
    MediaKind::DOWNLOADABLE.into_iter().collect()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_history_path() -> PathBuf {
    PathBuf::from("download_history.json")
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_converter_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_history_limit() -> usize {
    10
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
