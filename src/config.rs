//! Configuration types for chapter-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Shortest periodic wake interval the scheduler will honor
pub const MIN_WAKE_INTERVAL: Duration = Duration::from_secs(60);

/// Transfer behavior configuration (directories, HTTP client, retries)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory for page artifacts (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// User-Agent header sent with every page and chapter request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for transient failures within one page transfer
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
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
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./chapter-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Background wake-up configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between periodic wake-ups (default: 15 minutes, minimum: 60 seconds)
    #[serde(default = "default_wake_interval", with = "duration_serde")]
    pub wake_interval: Duration,

    /// How long a drain lease stays valid without a refresh (default: 10 minutes)
    ///
    /// Another process may take over the queue once a lease expires.
    #[serde(default = "default_drain_lease", with = "duration_serde")]
    pub drain_lease: Duration,
}

impl SchedulerConfig {
    /// Wake interval clamped to [`MIN_WAKE_INTERVAL`]
    pub fn effective_wake_interval(&self) -> Duration {
        self.wake_interval.max(MIN_WAKE_INTERVAL)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wake_interval: default_wake_interval(),
            drain_lease: default_drain_lease(),
        }
    }
}

/// Main configuration for ChapterDownloader
///
/// Every field has a default, so `Config::default()` is a working setup that
/// stores artifacts under `./downloads` and state in `./chapter-dl.db`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transfer behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Background wake-ups
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Root directory for page artifacts
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("chapter-dl.db")
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_wake_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_drain_lease() -> Duration {
    Duration::from_secs(10 * 60)
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
